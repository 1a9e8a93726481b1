//! Metrics push endpoint

mod encoding;
mod error;
mod handler;

pub use error::{TIMEOUT_MESSAGE, UploadError};

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::any;

use crate::domain::IngestPipeline;
use crate::domain::metrics::transform::Transformer;
use crate::domain::validate::Validator;

#[derive(Clone)]
pub struct UploadState {
    pub validator: Arc<dyn Validator>,
    pub pipeline: IngestPipeline,
    /// Process-wide pass, runs after the request-specific ones
    pub transformer: Arc<dyn Transformer>,
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

pub fn routes(state: UploadState) -> Router {
    Router::new()
        .route("/upload", any(handler::upload))
        .with_state(state)
}
