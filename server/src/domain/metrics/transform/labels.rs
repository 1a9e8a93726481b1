//! Label rewriting passes

use std::collections::{BTreeMap, HashSet};

use super::{TransformError, Transformer};
use crate::domain::metrics::family::{LabelPair, MetricFamily};

/// Stamps every sample with a fixed set of labels.
///
/// A sample that already carries one of the labels with a different value is
/// an error, so a client cannot push data on behalf of another partition.
#[derive(Debug, Clone, Default)]
pub struct RequireLabels {
    labels: BTreeMap<String, String>,
}

impl RequireLabels {
    pub fn new(labels: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }
}

impl Transformer for RequireLabels {
    fn transform(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        for metric in &mut family.metric {
            let mut added = false;
            for (name, expected) in &self.labels {
                match metric.label_value(name) {
                    Some(actual) if actual == expected => {}
                    Some(actual) => {
                        return Err(TransformError::RequiredLabelMismatch {
                            metric: family.name.clone().unwrap_or_default(),
                            label: name.clone(),
                            expected: expected.clone(),
                            actual: actual.to_string(),
                        });
                    }
                    None => {
                        metric.label.push(LabelPair::new(name.clone(), expected.clone()));
                        added = true;
                    }
                }
            }
            if added {
                metric.sort_labels();
            }
        }
        Ok(true)
    }
}

/// Removes the named labels from every sample
#[derive(Debug, Clone, Default)]
pub struct ElideLabels {
    names: HashSet<String>,
}

impl ElideLabels {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Transformer for ElideLabels {
    fn transform(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        for metric in &mut family.metric {
            metric.label.retain(|l| !self.names.contains(l.name()));
        }
        Ok(true)
    }
}
