use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::CONTENT_LENGTH;
use axum::http::request::Parts;
use axum::http::HeaderName;

use super::{ValidateError, Validated, Validator};
use crate::core::constants::MAX_PARTITION_KEY_LEN;
use crate::domain::context::RequestContext;
use crate::domain::metrics::transform::RequireLabels;

/// Takes the partition key from a request header and pins it onto every
/// sample as a label.
#[derive(Debug, Clone)]
pub struct HeaderValidator {
    header: HeaderName,
    partition_label: String,
    max_body_bytes: usize,
}

impl HeaderValidator {
    pub fn new(header: HeaderName, partition_label: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            header,
            partition_label: partition_label.into(),
            max_body_bytes,
        }
    }

    fn partition_key(&self, parts: &Parts) -> Result<String, ValidateError> {
        let raw = parts
            .headers
            .get(&self.header)
            .ok_or_else(|| ValidateError::MissingPartitionKey(self.header.to_string()))?;
        let key = raw
            .to_str()
            .map_err(|_| {
                ValidateError::InvalidPartitionKey(
                    String::from_utf8_lossy(raw.as_bytes()).into_owned(),
                )
            })?
            .trim();

        if key.is_empty() {
            return Err(ValidateError::MissingPartitionKey(self.header.to_string()));
        }
        if !is_valid_partition_key(key) {
            return Err(ValidateError::InvalidPartitionKey(key.to_string()));
        }
        Ok(key.to_string())
    }

    fn check_content_length(&self, parts: &Parts) -> Result<(), ValidateError> {
        let Some(value) = parts.headers.get(CONTENT_LENGTH) else {
            return Ok(());
        };
        let size: u64 = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or(ValidateError::InvalidContentLength)?;
        if size > self.max_body_bytes as u64 {
            return Err(ValidateError::BodyTooLarge {
                size,
                limit: self.max_body_bytes,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Validator for HeaderValidator {
    async fn validate(
        &self,
        _ctx: &RequestContext,
        parts: &Parts,
    ) -> Result<Validated, ValidateError> {
        self.check_content_length(parts)?;
        let partition_key = self.partition_key(parts)?;

        let require = RequireLabels::new([(self.partition_label.clone(), partition_key.clone())]);
        Ok(Validated {
            partition_key,
            transforms: vec![Arc::new(require)],
        })
    }
}

/// `[A-Za-z0-9._-]{1,MAX_PARTITION_KEY_LEN}`
fn is_valid_partition_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_PARTITION_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
