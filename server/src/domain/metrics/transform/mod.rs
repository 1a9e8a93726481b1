//! Transform passes over decoded metric families
//!
//! A [`Transformer`] looks at one family at a time. It may rewrite it in
//! place, ask for it to be dropped (`Ok(false)`), or reject the whole batch
//! (`Err`). Passes are composed with [`MultiTransformer`] and applied to a
//! batch in a single traversal by [`filter`].

mod drop_invalid;
mod labels;
mod whitelist;

pub use drop_invalid::DropInvalid;
pub use labels::{ElideLabels, RequireLabels};
pub use whitelist::{RuleParseError, Whitelist};

use std::sync::Arc;

use thiserror::Error;

use super::family::MetricFamily;

/// Error raised by a transform pass; rejects the whole request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("metric family has no name")]
    MissingName,

    #[error(
        "label {label:?} on metric {metric:?} must be {expected:?}, found {actual:?}"
    )]
    RequiredLabelMismatch {
        metric: String,
        label: String,
        expected: String,
        actual: String,
    },
}

pub trait Transformer: Send + Sync {
    /// Returns `Ok(false)` when the family should be dropped
    fn transform(&self, family: &mut MetricFamily) -> Result<bool, TransformError>;
}

/// Ordered chain of passes; stops at the first drop or error
#[derive(Clone, Default)]
pub struct MultiTransformer {
    transformers: Vec<Arc<dyn Transformer>>,
}

impl MultiTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one pass to the end of the chain
    pub fn with(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    /// Append several passes, keeping their order
    pub fn with_all(mut self, transformers: impl IntoIterator<Item = Arc<dyn Transformer>>) -> Self {
        self.transformers.extend(transformers);
        self
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl Transformer for MultiTransformer {
    fn transform(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        for transformer in &self.transformers {
            if !transformer.transform(family)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Run `transformer` over every family, dropping the ones it rejects
pub fn filter(
    families: Vec<MetricFamily>,
    transformer: &dyn Transformer,
) -> Result<Vec<MetricFamily>, TransformError> {
    let mut kept = Vec::with_capacity(families.len());
    for mut family in families {
        if transformer.transform(&mut family)? {
            kept.push(family);
        }
    }
    Ok(kept)
}
