//! Text exposition format (version 0.0.4) decoder
//!
//! The whole body is parsed on the first `decode` call, because samples of
//! summaries and histograms only form complete families once every `_sum`,
//! `_count` and `_bucket` line has been seen. Families are then yielded in
//! order of first appearance.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0, space1},
    combinator::{cut, map, opt, rest},
    multi::{fold_many0, separated_list0},
    sequence::{pair, preceded, separated_pair, terminated, tuple},
};

use super::{DecodeError, Decoder, read_body};
use crate::core::constants::MAX_DECODED_BODY_BYTES;
use crate::domain::metrics::family::{
    Bucket, Counter, Gauge, Histogram, LabelPair, Metric, MetricFamily, MetricType, Quantile,
    Summary, Untyped, is_valid_metric_name,
};
use crate::domain::metrics::syntax::{
    IResult, SyntaxError, label_name, map_fail, or_fail, parse_all, quoted_value, token,
};

const QUANTILE_LABEL: &str = "quantile";
const BUCKET_LABEL: &str = "le";

pub struct TextDecoder<R> {
    reader: Option<R>,
    parsed: VecDeque<MetricFamily>,
    body_limit: usize,
}

impl<R: Read> TextDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_body_limit(reader, MAX_DECODED_BODY_BYTES)
    }

    pub fn with_body_limit(reader: R, body_limit: usize) -> Self {
        Self {
            reader: Some(reader),
            parsed: VecDeque::new(),
            body_limit,
        }
    }
}

impl<R: Read + Send> Decoder for TextDecoder<R> {
    fn decode(&mut self) -> Result<Option<MetricFamily>, DecodeError> {
        if let Some(reader) = self.reader.take() {
            let input = String::from_utf8(read_body(reader, self.body_limit)?)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.parsed = parse(&input)?.into();
        }
        Ok(self.parsed.pop_front())
    }
}

/// Parse a complete text-format document
pub fn parse(input: &str) -> Result<Vec<MetricFamily>, DecodeError> {
    let mut parser = TextParser::default();
    for (i, line) in input.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_all(text_line, line).map_err(|e| text_error(line_no, e.message))? {
            Line::Comment(comment) => parser.comment(comment, line_no)?,
            Line::Sample(sample) => parser.sample(sample, line_no)?,
        }
    }
    Ok(parser.finish())
}

#[derive(Default)]
struct FamilyState {
    help_seen: bool,
    type_seen: bool,
    sampled: bool,
}

/// What a sample line contributes to its family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleRole {
    Value,
    Quantile,
    Bucket,
    Sum,
    Count,
}

#[derive(Default)]
struct TextParser {
    families: Vec<MetricFamily>,
    states: Vec<FamilyState>,
    index: HashMap<String, usize>,
    // (family, label signature) -> metric position, for summaries and histograms
    series: HashMap<(usize, String), usize>,
}

impl TextParser {
    fn family_index(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.families.len();
        self.families.push(MetricFamily {
            name: Some(name.to_string()),
            ..Default::default()
        });
        self.states.push(FamilyState::default());
        self.index.insert(name.to_string(), idx);
        idx
    }

    fn comment(&mut self, comment: Comment<'_>, line: usize) -> Result<(), DecodeError> {
        match comment {
            Comment::Help { name, text } => {
                let idx = self.family_index(name);
                if self.states[idx].help_seen {
                    return Err(text_error(
                        line,
                        format!("second HELP line for metric name {name:?}"),
                    ));
                }
                self.states[idx].help_seen = true;
                self.families[idx].help = Some(text);
            }
            Comment::Type { name, metric_type } => {
                let idx = self.family_index(name);
                let state = &mut self.states[idx];
                if state.type_seen || state.sampled {
                    return Err(text_error(
                        line,
                        format!("second TYPE line for metric name {name:?}, or TYPE reported after samples"),
                    ));
                }
                state.type_seen = true;
                self.families[idx].r#type = Some(metric_type as i32);
            }
            // Any other comment is ignored
            Comment::Other => {}
        }
        Ok(())
    }

    /// Find the family a sample named `name` belongs to
    fn resolve(&mut self, name: &str) -> (usize, SampleRole) {
        if let Some(&idx) = self.index.get(name) {
            let role = match self.families[idx].metric_type() {
                MetricType::Summary => SampleRole::Quantile,
                MetricType::Histogram => SampleRole::Bucket,
                _ => SampleRole::Value,
            };
            // A histogram declared under its own name only accepts suffixed samples
            if role != SampleRole::Bucket || self.states[idx].type_seen {
                return (idx, role);
            }
        }

        let suffixes = [
            ("_bucket", SampleRole::Bucket),
            ("_sum", SampleRole::Sum),
            ("_count", SampleRole::Count),
        ];
        for (suffix, role) in suffixes {
            let Some(base) = name.strip_suffix(suffix) else {
                continue;
            };
            let Some(&idx) = self.index.get(base) else {
                continue;
            };
            let base_type = self.families[idx].metric_type();
            let matches = match role {
                SampleRole::Bucket => base_type == MetricType::Histogram,
                _ => matches!(base_type, MetricType::Summary | MetricType::Histogram),
            };
            if matches && self.states[idx].type_seen {
                return (idx, role);
            }
        }

        (self.family_index(name), SampleRole::Value)
    }

    fn sample(&mut self, sample: Sample<'_>, line: usize) -> Result<(), DecodeError> {
        let (idx, role) = self.resolve(sample.name);

        let state = &mut self.states[idx];
        state.sampled = true;
        if !state.type_seen && self.families[idx].r#type.is_none() {
            self.families[idx].r#type = Some(MetricType::Untyped as i32);
        }

        let metric_type = self.families[idx].metric_type();
        if role == SampleRole::Bucket && sample.name == self.families[idx].name() {
            return Err(text_error(
                line,
                format!(
                    "histogram {:?} samples must use the _bucket, _sum or _count suffix",
                    sample.name
                ),
            ));
        }

        match role {
            SampleRole::Value => {
                let mut metric = Metric {
                    label: sample.labels,
                    timestamp_ms: sample.timestamp_ms,
                    ..Default::default()
                };
                metric.sort_labels();
                let value = Some(sample.value);
                match metric_type {
                    MetricType::Counter => metric.counter = Some(Counter { value }),
                    MetricType::Gauge => metric.gauge = Some(Gauge { value }),
                    _ => metric.untyped = Some(Untyped { value }),
                }
                self.families[idx].metric.push(metric);
            }
            SampleRole::Quantile | SampleRole::Bucket | SampleRole::Sum | SampleRole::Count => {
                self.aggregate_sample(idx, metric_type, role, sample, line)?;
            }
        }
        Ok(())
    }

    fn aggregate_sample(
        &mut self,
        idx: usize,
        metric_type: MetricType,
        role: SampleRole,
        sample: Sample<'_>,
        line: usize,
    ) -> Result<(), DecodeError> {
        let special = match role {
            SampleRole::Quantile => Some(QUANTILE_LABEL),
            SampleRole::Bucket => Some(BUCKET_LABEL),
            _ => None,
        };

        let mut bound = None;
        let mut labels = Vec::with_capacity(sample.labels.len());
        for label in sample.labels {
            if Some(label.name()) == special {
                bound = Some(parse_float(label.value()).map_err(|e| text_error(line, e.message))?);
            } else {
                labels.push(label);
            }
        }
        if let Some(special) = special
            && bound.is_none()
        {
            return Err(text_error(
                line,
                format!("{:?} sample is missing the {special:?} label", sample.name),
            ));
        }
        labels.sort_by(|a, b| a.name().cmp(b.name()));

        let signature = labels
            .iter()
            .map(|l| format!("{}={}", l.name(), l.value()))
            .collect::<Vec<_>>()
            .join("\u{ff}");

        let family = &mut self.families[idx];
        let pos = match self.series.entry((idx, signature)) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let mut metric = Metric {
                    label: labels,
                    ..Default::default()
                };
                if metric_type == MetricType::Summary {
                    metric.summary = Some(Summary::default());
                } else {
                    metric.histogram = Some(Histogram::default());
                }
                family.metric.push(metric);
                *e.insert(family.metric.len() - 1)
            }
        };

        let metric = &mut family.metric[pos];
        if sample.timestamp_ms.is_some() {
            metric.timestamp_ms = sample.timestamp_ms;
        }

        let count = sample.value.max(0.0) as u64;
        match (metric.summary.as_mut(), metric.histogram.as_mut(), role) {
            (Some(summary), _, SampleRole::Quantile) => summary.quantile.push(Quantile {
                quantile: bound,
                value: Some(sample.value),
            }),
            (Some(summary), _, SampleRole::Sum) => summary.sample_sum = Some(sample.value),
            (Some(summary), _, SampleRole::Count) => summary.sample_count = Some(count),
            (_, Some(histogram), SampleRole::Bucket) => histogram.bucket.push(Bucket {
                cumulative_count: Some(count),
                upper_bound: bound,
            }),
            (_, Some(histogram), SampleRole::Sum) => histogram.sample_sum = Some(sample.value),
            (_, Some(histogram), SampleRole::Count) => histogram.sample_count = Some(count),
            _ => {
                return Err(text_error(
                    line,
                    format!("sample {:?} does not fit its family", sample.name),
                ));
            }
        }
        Ok(())
    }

    fn finish(self) -> Vec<MetricFamily> {
        self.families
            .into_iter()
            .filter(|f| !f.metric.is_empty())
            .collect()
    }
}

enum Line<'a> {
    Comment(Comment<'a>),
    Sample(Sample<'a>),
}

enum Comment<'a> {
    Help { name: &'a str, text: String },
    Type { name: &'a str, metric_type: MetricType },
    Other,
}

struct Sample<'a> {
    name: &'a str,
    labels: Vec<LabelPair>,
    value: f64,
    timestamp_ms: Option<i64>,
}

fn text_line(i: &str) -> IResult<&str, Line<'_>> {
    alt((map(comment, Line::Comment), map(sample, Line::Sample)))(i)
}

fn comment(i: &str) -> IResult<&str, Comment<'_>> {
    let help = preceded(
        pair(tag("HELP"), space1),
        cut(pair(metric_name, preceded(space0, help_text))),
    );
    let type_line = preceded(
        pair(tag("TYPE"), space1),
        cut(separated_pair(metric_name, space1, metric_type)),
    );

    preceded(
        pair(char('#'), space0),
        alt((
            map(help, |(name, text)| Comment::Help { name, text }),
            map(type_line, |(name, metric_type)| Comment::Type { name, metric_type }),
            map(rest, |_| Comment::Other),
        )),
    )(i)
}

/// HELP text; only `\\` and `\n` are escapes, any other backslash is literal
fn help_text(i: &str) -> IResult<&str, String> {
    let fragment = alt((
        map(tag("\\n"), |_| "\n"),
        map(tag("\\\\"), |_| "\\"),
        tag("\\"),
        take_while1(|c: char| c != '\\'),
    ));
    fold_many0(fragment, String::new, |mut acc: String, s: &str| {
        acc.push_str(s);
        acc
    })(i)
}

fn metric_type(i: &str) -> IResult<&str, MetricType> {
    map_fail(token, parse_metric_type)(i)
}

fn parse_metric_type(token: &str) -> Result<MetricType, SyntaxError> {
    MetricType::parse(token)
        .ok_or_else(|| SyntaxError::new(format!("unknown metric type {token:?}")))
}

fn sample(i: &str) -> IResult<&str, Sample<'_>> {
    map(
        tuple((
            metric_name,
            opt(preceded(space0, label_set)),
            preceded(space0, map_fail(token, sample_value)),
            opt(preceded(space1, map_fail(token, timestamp))),
        )),
        |(name, labels, value, timestamp_ms)| Sample {
            name,
            labels: labels.unwrap_or_default(),
            value,
            timestamp_ms,
        },
    )(i)
}

fn metric_name(i: &str) -> IResult<&str, &str> {
    map_fail(
        take_while1(|c: char| c != '{' && !c.is_whitespace()),
        check_metric_name,
    )(i)
}

/// `{name="value",...}`, trailing comma allowed
fn label_set(i: &str) -> IResult<&str, Vec<LabelPair>> {
    let label = map(
        separated_pair(
            label_name,
            tuple((space0, or_fail(char('='), "'=' after label name"), space0)),
            quoted_value,
        ),
        |(name, value)| LabelPair::new(name, value),
    );
    let labels = map_fail(
        separated_list0(tuple((space0, char(','), space0)), label),
        unique_labels,
    );

    preceded(
        char('{'),
        cut(terminated(
            preceded(space0, labels),
            tuple((
                space0,
                opt(char(',')),
                space0,
                or_fail(char('}'), "',' or '}' after label value"),
            )),
        )),
    )(i)
}

fn unique_labels(labels: Vec<LabelPair>) -> Result<Vec<LabelPair>, SyntaxError> {
    for (i, label) in labels.iter().enumerate() {
        if labels[..i].iter().any(|l| l.name() == label.name()) {
            return Err(SyntaxError::new(format!(
                "duplicate label name {:?}",
                label.name()
            )));
        }
    }
    Ok(labels)
}

fn sample_value(token: &str) -> Result<f64, SyntaxError> {
    if token.is_empty() {
        return Err(SyntaxError::new("missing sample value"));
    }
    parse_float(token)
}

fn timestamp(token: &str) -> Result<i64, SyntaxError> {
    token
        .parse::<i64>()
        .map_err(|_| SyntaxError::new(format!("invalid timestamp {token:?}")))
}

fn parse_float(s: &str) -> Result<f64, SyntaxError> {
    s.parse::<f64>()
        .map_err(|_| SyntaxError::new(format!("expected float as value, got {s:?}")))
}

fn check_metric_name(name: &str) -> Result<&str, SyntaxError> {
    if is_valid_metric_name(name) {
        Ok(name)
    } else {
        Err(SyntaxError::new(format!("invalid metric name {name:?}")))
    }
}

fn text_error(line: usize, message: impl Into<String>) -> DecodeError {
    DecodeError::Text {
        line,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> Result<Vec<MetricFamily>, DecodeError> {
        let mut decoder = TextDecoder::new(input.as_bytes());
        let mut out = Vec::new();
        while let Some(family) = decoder.decode()? {
            out.push(family);
        }
        Ok(out)
    }

    #[test]
    fn test_counter_with_metadata() {
        let input = r#"
# HELP http_requests_total The total number of HTTP requests.
# TYPE http_requests_total counter
http_requests_total{method="post",code="200"} 1027 1395066363000
http_requests_total{method="post",code="400"}    3 1395066363000
"#;
        let families = decode_all(input).unwrap();
        assert_eq!(families.len(), 1);

        let family = &families[0];
        assert_eq!(family.name(), "http_requests_total");
        assert_eq!(family.help(), "The total number of HTTP requests.");
        assert_eq!(family.metric_type(), MetricType::Counter);
        assert_eq!(family.metric.len(), 2);

        let first = &family.metric[0];
        // labels are sorted by name
        assert_eq!(first.label[0].name(), "code");
        assert_eq!(first.label[1].name(), "method");
        assert_eq!(first.counter.as_ref().unwrap().value(), 1027.0);
        assert_eq!(first.timestamp_ms, Some(1395066363000));
    }

    #[test]
    fn test_body_limit() {
        let input = "up 1\n";
        let mut decoder = TextDecoder::with_body_limit(input.as_bytes(), 4);
        assert!(matches!(
            decoder.decode(),
            Err(DecodeError::BodyTooLarge { limit: 4 })
        ));

        let mut decoder = TextDecoder::with_body_limit(input.as_bytes(), input.len());
        assert_eq!(decoder.decode().unwrap().unwrap().name(), "up");
    }

    #[test]
    fn test_untyped_samples_without_metadata() {
        let families = decode_all("up 1\nprocess_open_fds 12\n").unwrap();
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].name(), "up");
        assert_eq!(families[0].metric_type(), MetricType::Untyped);
        assert_eq!(
            families[0].metric[0].untyped.as_ref().unwrap().value(),
            1.0
        );
        assert_eq!(families[1].name(), "process_open_fds");
    }

    #[test]
    fn test_label_value_escapes() {
        let input = r#"msg{text="a \"quoted\" \\ value\nnext"} 1"#;
        let families = decode_all(input).unwrap();
        assert_eq!(
            families[0].metric[0].label_value("text"),
            Some("a \"quoted\" \\ value\nnext")
        );
    }

    #[test]
    fn test_special_float_values() {
        let input = "# TYPE g gauge\ng{a=\"1\"} NaN\ng{a=\"2\"} +Inf\ng{a=\"3\"} -Inf\n";
        let families = decode_all(input).unwrap();
        let values: Vec<f64> = families[0]
            .metric
            .iter()
            .map(|m| m.gauge.as_ref().unwrap().value())
            .collect();
        assert!(values[0].is_nan());
        assert_eq!(values[1], f64::INFINITY);
        assert_eq!(values[2], f64::NEG_INFINITY);
    }

    #[test]
    fn test_histogram_grouping() {
        let input = r#"
# HELP rpc_duration_seconds RPC latency.
# TYPE rpc_duration_seconds histogram
rpc_duration_seconds_bucket{le="0.1",service="a"} 5
rpc_duration_seconds_bucket{le="+Inf",service="a"} 8
rpc_duration_seconds_sum{service="a"} 1.5
rpc_duration_seconds_count{service="a"} 8
rpc_duration_seconds_bucket{le="+Inf",service="b"} 1
rpc_duration_seconds_count{service="b"} 1
"#;
        let families = decode_all(input).unwrap();
        assert_eq!(families.len(), 1);
        let family = &families[0];
        assert_eq!(family.metric_type(), MetricType::Histogram);
        assert_eq!(family.metric.len(), 2);

        let a = &family.metric[0];
        assert_eq!(a.label_value("service"), Some("a"));
        assert_eq!(a.label_value("le"), None);
        let histogram = a.histogram.as_ref().unwrap();
        assert_eq!(histogram.bucket.len(), 2);
        assert_eq!(histogram.bucket[0].upper_bound(), 0.1);
        assert_eq!(histogram.bucket[1].upper_bound(), f64::INFINITY);
        assert_eq!(histogram.sample_sum(), 1.5);
        assert_eq!(histogram.sample_count(), 8);

        let b = family.metric[1].histogram.as_ref().unwrap();
        assert_eq!(b.sample_count(), 1);
    }

    #[test]
    fn test_summary_grouping() {
        let input = r#"
# TYPE rpc_latency summary
rpc_latency{quantile="0.5"} 0.2
rpc_latency{quantile="0.99"} 0.9
rpc_latency_sum 12
rpc_latency_count 40
"#;
        let families = decode_all(input).unwrap();
        let summary = families[0].metric[0].summary.as_ref().unwrap();
        assert_eq!(summary.quantile.len(), 2);
        assert_eq!(summary.quantile[1].quantile(), 0.99);
        assert_eq!(summary.sample_sum(), 12.0);
        assert_eq!(summary.sample_count(), 40);
    }

    #[test]
    fn test_sum_without_typed_base_is_untyped_family() {
        let families = decode_all("foo_sum 3\n").unwrap();
        assert_eq!(families[0].name(), "foo_sum");
        assert_eq!(families[0].metric_type(), MetricType::Untyped);
    }

    #[test]
    fn test_metadata_only_family_is_dropped() {
        let input = "# HELP empty nothing here\n# TYPE empty gauge\nup 1\n";
        let families = decode_all(input).unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name(), "up");
    }

    #[test]
    fn test_help_unescape() {
        let families = decode_all("# HELP a line one\\nline two \\\\ end\na 1\n").unwrap();
        assert_eq!(families[0].help(), "line one\nline two \\ end");
    }

    #[test]
    fn test_invalid_value_reports_line() {
        let err = decode_all("up 1\nup{a=\"b\"} one\n").unwrap_err();
        match err {
            DecodeError::Text { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_type_after_samples_rejected() {
        let err = decode_all("up 1\n# TYPE up gauge\n").unwrap_err();
        assert!(matches!(err, DecodeError::Text { line: 2, .. }));
    }

    #[test]
    fn test_second_help_rejected() {
        let err = decode_all("# HELP up a\n# HELP up b\nup 1\n").unwrap_err();
        assert!(matches!(err, DecodeError::Text { line: 2, .. }));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(decode_all("# TYPE up meter\n").is_err());
    }

    #[test]
    fn test_malformed_labels_rejected() {
        assert!(decode_all("up{a=\"b\" 1\n").is_err());
        assert!(decode_all("up{a=b} 1\n").is_err());
        assert!(decode_all("up{a=\"1\",a=\"2\"} 1\n").is_err());
        assert!(decode_all("up{0a=\"1\"} 1\n").is_err());
    }

    #[test]
    fn test_label_set_spacing_and_trailing_comma() {
        let families = decode_all("up{ a = \"1\" , b=\"2\", } 1\nup{} 2\n").unwrap();
        let metrics = &families[0].metric;
        assert_eq!(metrics[0].label_value("a"), Some("1"));
        assert_eq!(metrics[0].label_value("b"), Some("2"));
        assert!(metrics[1].label.is_empty());
    }

    #[test]
    fn test_error_messages_name_the_problem() {
        let message = |input: &str| match decode_all(input).unwrap_err() {
            DecodeError::Text { message, .. } => message,
            other => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(
            message("up{a=\"b\" 1\n"),
            "expected ',' or '}' after label value"
        );
        assert_eq!(
            message("up{a=\"x\\q\"} 1\n"),
            "invalid escape sequence '\\q'"
        );
        assert_eq!(message("up\n"), "missing sample value");
        assert_eq!(
            message("# TYPE up meter\n"),
            "unknown metric type \"meter\""
        );
        assert_eq!(message("up-time 1\n"), "invalid metric name \"up-time\"");
    }

    #[test]
    fn test_missing_quantile_label_rejected() {
        let input = "# TYPE s summary\ns 1\n";
        assert!(decode_all(input).is_err());
    }

    #[test]
    fn test_histogram_base_name_sample_rejected() {
        let input = "# TYPE h histogram\nh 1\n";
        assert!(decode_all(input).is_err());
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(decode_all("up 1 1000 extra\n").is_err());
    }

    #[test]
    fn test_non_utf8_body() {
        let mut decoder = TextDecoder::new(&[0xffu8, 0xfe, 0xfd][..]);
        assert!(matches!(decoder.decode(), Err(DecodeError::Io(_))));
    }

    #[test]
    fn test_empty_body() {
        assert!(decode_all("").unwrap().is_empty());
        assert!(decode_all("\n# just a comment\n\n").unwrap().is_empty());
    }
}
