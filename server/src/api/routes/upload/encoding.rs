//! Body decompression and decoder selection

use std::io::{self, Cursor};

use axum::body::{Body, Bytes, to_bytes};
use axum::http::{HeaderMap, header};
use snap::read::FrameDecoder;

use crate::domain::metrics::decode::{DecodeError, Decoder, ExpositionFormat};

/// Compression applied to the request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    /// Snappy framing format
    Snappy,
}

impl ContentEncoding {
    /// Only `snappy` is recognised; anything else is read as is
    #[inline]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let encoding = headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if encoding.trim().eq_ignore_ascii_case("snappy") {
            ContentEncoding::Snappy
        } else {
            ContentEncoding::Identity
        }
    }
}

/// Exposition format negotiated from `Content-Type`
#[inline]
pub fn format_from_headers(headers: &HeaderMap) -> ExpositionFormat {
    ExpositionFormat::from_content_type(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    )
}

/// Collect the body (bounded by `limit`) and wrap it in a decoder
pub async fn body_decoder(
    body: Body,
    limit: usize,
    encoding: ContentEncoding,
    format: ExpositionFormat,
) -> Result<Box<dyn Decoder>, DecodeError> {
    let bytes = to_bytes(body, limit)
        .await
        .map_err(|e| DecodeError::Io(io::Error::other(e)))?;
    Ok(decoder_for(bytes, encoding, format))
}

pub fn decoder_for(
    bytes: Bytes,
    encoding: ContentEncoding,
    format: ExpositionFormat,
) -> Box<dyn Decoder> {
    let reader = Cursor::new(bytes);
    match encoding {
        ContentEncoding::Identity => format.decoder(reader),
        ContentEncoding::Snappy => format.decoder(FrameDecoder::new(reader)),
    }
}
