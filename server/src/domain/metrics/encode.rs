//! Text exposition format (version 0.0.4) encoder

use std::fmt::Write;

use super::family::{LabelPair, Metric, MetricFamily, MetricType};

/// Render families in the text format. Families without samples are skipped.
pub fn encode_text(families: &[MetricFamily]) -> String {
    let mut out = String::new();
    for family in families.iter().filter(|f| !f.metric.is_empty()) {
        write_family(&mut out, family);
    }
    out
}

fn write_family(out: &mut String, family: &MetricFamily) {
    let name = family.name();
    let metric_type = family.metric_type();

    if let Some(help) = &family.help {
        let _ = writeln!(out, "# HELP {name} {}", escape_help(help));
    }
    let _ = writeln!(out, "# TYPE {name} {}", metric_type.as_str());

    for metric in &family.metric {
        match metric_type {
            MetricType::Counter => {
                let value = metric.counter.as_ref().map(|c| c.value());
                write_sample(out, name, "", metric, None, value);
            }
            MetricType::Gauge => {
                let value = metric.gauge.as_ref().map(|g| g.value());
                write_sample(out, name, "", metric, None, value);
            }
            MetricType::Untyped => {
                let value = metric.untyped.as_ref().map(|u| u.value());
                write_sample(out, name, "", metric, None, value);
            }
            MetricType::Summary => {
                let Some(summary) = &metric.summary else {
                    continue;
                };
                for q in &summary.quantile {
                    let extra = ("quantile", format_float(q.quantile()));
                    write_sample(out, name, "", metric, Some(extra), Some(q.value()));
                }
                write_sample(out, name, "_sum", metric, None, Some(summary.sample_sum()));
                write_count(out, name, metric, summary.sample_count());
            }
            MetricType::Histogram => {
                let Some(histogram) = &metric.histogram else {
                    continue;
                };
                let mut saw_inf = false;
                for bucket in &histogram.bucket {
                    saw_inf |= bucket.upper_bound() == f64::INFINITY;
                    let extra = ("le", format_float(bucket.upper_bound()));
                    let count = bucket.cumulative_count() as f64;
                    write_sample(out, name, "_bucket", metric, Some(extra), Some(count));
                }
                if !saw_inf {
                    let extra = ("le", "+Inf".to_string());
                    let count = histogram.sample_count() as f64;
                    write_sample(out, name, "_bucket", metric, Some(extra), Some(count));
                }
                write_sample(out, name, "_sum", metric, None, Some(histogram.sample_sum()));
                write_count(out, name, metric, histogram.sample_count());
            }
        }
    }
}

fn write_count(out: &mut String, name: &str, metric: &Metric, count: u64) {
    write_sample(out, name, "_count", metric, None, Some(count as f64));
}

fn write_sample(
    out: &mut String,
    name: &str,
    suffix: &str,
    metric: &Metric,
    extra: Option<(&str, String)>,
    value: Option<f64>,
) {
    let Some(value) = value else {
        return;
    };

    out.push_str(name);
    out.push_str(suffix);
    write_labels(out, &metric.label, extra);
    let _ = write!(out, " {}", format_float(value));
    if let Some(ts) = metric.timestamp_ms {
        let _ = write!(out, " {ts}");
    }
    out.push('\n');
}

fn write_labels(out: &mut String, labels: &[LabelPair], extra: Option<(&str, String)>) {
    if labels.is_empty() && extra.is_none() {
        return;
    }

    out.push('{');
    let mut first = true;
    let pairs = labels
        .iter()
        .map(|l| (l.name(), l.value()))
        .chain(extra.as_ref().map(|(k, v)| (*k, v.as_str())));
    for (name, value) in pairs {
        if !first {
            out.push(',');
        }
        first = false;
        let _ = write!(out, "{name}=\"{}\"", escape_label_value(value));
    }
    out.push('}');
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

fn escape_help(s: &str) -> String {
    s.replace('\\', r"\\").replace('\n', r"\n")
}

fn escape_label_value(s: &str) -> String {
    s.replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('\n', r"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::decode::{Decoder, TextDecoder};
    use crate::domain::metrics::family::{Bucket, Counter, Gauge, Histogram, Quantile, Summary};

    #[test]
    fn test_counter_with_help_and_labels() {
        let mut family = MetricFamily::new("requests_total", MetricType::Counter);
        family.help = Some("Total\nrequests \\ served".to_string());
        family.metric.push(Metric {
            label: vec![
                LabelPair::new("_id", "cluster-a"),
                LabelPair::new("path", "/a\"b"),
            ],
            counter: Some(Counter { value: Some(42.0) }),
            timestamp_ms: Some(1_700_000_000_000),
            ..Default::default()
        });

        assert_eq!(
            encode_text(&[family]),
            "# HELP requests_total Total\\nrequests \\\\ served\n\
             # TYPE requests_total counter\n\
             requests_total{_id=\"cluster-a\",path=\"/a\\\"b\"} 42 1700000000000\n"
        );
    }

    #[test]
    fn test_gauge_special_values() {
        let mut family = MetricFamily::new("temp", MetricType::Gauge);
        for v in [f64::INFINITY, f64::NEG_INFINITY, 0.5] {
            family.metric.push(Metric {
                gauge: Some(Gauge { value: Some(v) }),
                ..Default::default()
            });
        }

        assert_eq!(
            encode_text(&[family]),
            "# TYPE temp gauge\ntemp +Inf\ntemp -Inf\ntemp 0.5\n"
        );
    }

    #[test]
    fn test_histogram_adds_inf_bucket() {
        let mut family = MetricFamily::new("latency", MetricType::Histogram);
        family.metric.push(Metric {
            histogram: Some(Histogram {
                sample_count: Some(3),
                sample_sum: Some(1.5),
                bucket: vec![Bucket {
                    cumulative_count: Some(2),
                    upper_bound: Some(0.5),
                }],
            }),
            ..Default::default()
        });

        assert_eq!(
            encode_text(&[family]),
            "# TYPE latency histogram\n\
             latency_bucket{le=\"0.5\"} 2\n\
             latency_bucket{le=\"+Inf\"} 3\n\
             latency_sum 1.5\n\
             latency_count 3\n"
        );
    }

    #[test]
    fn test_summary_decodes_back() {
        let mut family = MetricFamily::new("rpc", MetricType::Summary);
        family.metric.push(Metric {
            label: vec![LabelPair::new("job", "api")],
            summary: Some(Summary {
                sample_count: Some(10),
                sample_sum: Some(4.0),
                quantile: vec![Quantile {
                    quantile: Some(0.99),
                    value: Some(0.8),
                }],
            }),
            ..Default::default()
        });

        let text = encode_text(std::slice::from_ref(&family));
        let mut decoder = TextDecoder::new(text.as_bytes());
        let decoded = decoder.decode().unwrap().unwrap();

        assert_eq!(decoded.metric_type(), MetricType::Summary);
        let summary = decoded.metric[0].summary.as_ref().unwrap();
        assert_eq!(summary.sample_count(), 10);
        assert_eq!(summary.quantile[0].quantile(), 0.99);
        assert_eq!(decoded.metric[0].label_value("job"), Some("api"));
    }

    #[test]
    fn test_empty_family_skipped() {
        let family = MetricFamily::new("nothing", MetricType::Gauge);
        assert_eq!(encode_text(&[family]), "");
    }
}
