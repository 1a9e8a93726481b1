//! Upload endpoint errors and their HTTP mapping

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::domain::{IngestError, ValidateError};

/// Message returned when the pipeline misses its deadline
pub const TIMEOUT_MESSAGE: &str = "Timeout while storing metrics";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Validation(#[from] ValidateError),

    #[error("{0}")]
    Ingest(#[from] IngestError),

    #[error("write limit reached for key {partition_key}")]
    RateLimited { partition_key: String },

    #[error("Timeout while storing metrics")]
    Timeout,

    #[error("ingestion task ended without an outcome")]
    TaskLost,
}

impl UploadError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            UploadError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            UploadError::Validation(_)
            | UploadError::Ingest(_)
            | UploadError::Timeout
            | UploadError::TaskLost => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let UploadError::MethodNotAllowed = self {
            return status.into_response();
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
