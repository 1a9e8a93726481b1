//! Exposition format decoders
//!
//! A decoder yields one [`MetricFamily`] per call until the stream is
//! exhausted. `Ok(None)` is the clean end of stream; any `Err` means the body
//! is malformed or unreadable and nothing decoded so far should be used.

mod delimited;
mod text;

pub use delimited::DelimitedDecoder;
pub use text::TextDecoder;

use std::io::{self, Read};

use thiserror::Error;

use super::family::MetricFamily;

/// Streaming source of metric families
pub trait Decoder: Send {
    fn decode(&mut self) -> Result<Option<MetricFamily>, DecodeError>;
}

/// Wire grammar of a pushed body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpositionFormat {
    /// Text exposition format, version 0.0.4
    Text,
    /// Varint length-prefixed `io.prometheus.client.MetricFamily` messages
    ProtoDelimited,
}

impl ExpositionFormat {
    pub const PROTO_DELIMITED_CONTENT_TYPE: &'static str = "application/vnd.google.protobuf; proto=io.prometheus.client.MetricFamily; encoding=delimited";
    pub const TEXT_CONTENT_TYPE: &'static str = "text/plain; version=0.0.4; charset=utf-8";

    /// Negotiate the format from a `Content-Type` value.
    ///
    /// Only the delimited protobuf media type selects protobuf; everything
    /// else, including a missing or unparseable header, falls back to text.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return ExpositionFormat::Text;
        };

        let mut parts = content_type.split(';').map(str::trim);
        let media_type = parts.next().unwrap_or_default();
        if !media_type.eq_ignore_ascii_case("application/vnd.google.protobuf") {
            return ExpositionFormat::Text;
        }

        let mut proto = None;
        let mut encoding = None;
        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                let value = value.trim().trim_matches('"');
                match key.trim().to_ascii_lowercase().as_str() {
                    "proto" => proto = Some(value),
                    "encoding" => encoding = Some(value),
                    _ => {}
                }
            }
        }

        if proto == Some("io.prometheus.client.MetricFamily") && encoding == Some("delimited") {
            ExpositionFormat::ProtoDelimited
        } else {
            ExpositionFormat::Text
        }
    }

    /// Build a decoder of this format over `reader`
    pub fn decoder<R>(self, reader: R) -> Box<dyn Decoder>
    where
        R: Read + Send + 'static,
    {
        match self {
            ExpositionFormat::Text => Box::new(TextDecoder::new(reader)),
            ExpositionFormat::ProtoDelimited => Box::new(DelimitedDecoder::new(reader)),
        }
    }
}

/// Read the whole of `reader`, failing once it yields more than `limit` bytes
fn read_body<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>, DecodeError> {
    let mut body = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut body)?;
    if body.len() > limit {
        return Err(DecodeError::BodyTooLarge { limit });
    }
    Ok(body)
}

/// Error returned when a body cannot be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read body: {0}")]
    Io(#[from] io::Error),

    #[error("text format parsing error in line {line}: {message}")]
    Text { line: usize, message: String },

    #[error("unexpected end of stream inside a message")]
    Truncated,

    #[error("invalid varint length prefix")]
    InvalidLength,

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("decoded body exceeds the {limit} byte limit")]
    BodyTooLarge { limit: usize },

    #[error("protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("invalid metric name {0:?}")]
    InvalidMetricName(String),

    #[error("invalid label name {label:?} on metric {metric:?}")]
    InvalidLabelName { metric: String, label: String },
}
