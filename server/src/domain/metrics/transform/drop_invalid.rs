use super::{TransformError, Transformer};
use crate::domain::metrics::family::MetricFamily;

/// Rejects unnamed families and drops samples that do not carry the value
/// kind their family declares. A family left without samples is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropInvalid;

impl Transformer for DropInvalid {
    fn transform(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        if family.name().is_empty() {
            return Err(TransformError::MissingName);
        }

        let metric_type = family.metric_type();
        let before = family.metric.len();
        family.metric.retain(|m| m.matches_type(metric_type));
        let dropped = before - family.metric.len();
        if dropped > 0 {
            tracing::debug!(
                family = family.name(),
                dropped,
                "Dropped samples not matching declared type"
            );
        }

        Ok(!family.metric.is_empty())
    }
}
