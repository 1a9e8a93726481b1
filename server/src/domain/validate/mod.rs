//! Request validation
//!
//! A [`Validator`] inspects the request head before any of the body is read.
//! It derives the partition key and the transform passes that only apply to
//! this request.

mod header;

pub use header::HeaderValidator;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;
use thiserror::Error;

use crate::domain::context::RequestContext;
use crate::domain::metrics::transform::Transformer;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("missing partition key header {0}")]
    MissingPartitionKey(String),

    #[error("invalid partition key {0:?}")]
    InvalidPartitionKey(String),

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    #[error("request body of {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: u64, limit: usize },
}

/// Result of a successful validation
pub struct Validated {
    pub partition_key: String,
    /// Passes run before the process-wide transformer
    pub transforms: Vec<Arc<dyn Transformer>>,
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        ctx: &RequestContext,
        parts: &Parts,
    ) -> Result<Validated, ValidateError>;
}
