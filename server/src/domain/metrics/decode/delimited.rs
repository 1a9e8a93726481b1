//! Length-delimited protobuf decoder

use std::io::Read;

use prost::Message;
use prost::bytes::{Buf, Bytes};

use super::{DecodeError, Decoder, read_body};
use crate::core::constants::{MAX_DECODED_BODY_BYTES, MAX_DELIMITED_MESSAGE_BYTES};
use crate::domain::metrics::family::{MetricFamily, is_valid_label_name, is_valid_metric_name};

/// Longest valid varint encoding
const MAX_VARINT_LEN: usize = 10;

/// Reads `varint(len) || MetricFamily` records until EOF.
///
/// The body is read into memory on the first `decode` call; messages are then
/// sliced out of it, so no allocation is sized by an untrusted prefix. The
/// read stops at `body_limit`, which bounds decompressed input.
pub struct DelimitedDecoder<R> {
    reader: Option<R>,
    buf: Bytes,
    body_limit: usize,
}

impl<R: Read> DelimitedDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_body_limit(reader, MAX_DECODED_BODY_BYTES)
    }

    pub fn with_body_limit(reader: R, body_limit: usize) -> Self {
        Self {
            reader: Some(reader),
            buf: Bytes::new(),
            body_limit,
        }
    }

    /// Read the varint length prefix. `None` once the body is exhausted.
    fn read_length(&mut self) -> Result<Option<usize>, DecodeError> {
        if !self.buf.has_remaining() {
            return Ok(None);
        }
        let before = self.buf.clone();
        match prost::decode_length_delimiter(&mut self.buf) {
            Ok(size) => Ok(Some(size)),
            // Every byte left carries the continuation bit: the body ended mid-prefix
            Err(_)
                if before.len() < MAX_VARINT_LEN && before.iter().all(|b| b & 0x80 != 0) =>
            {
                Err(DecodeError::Truncated)
            }
            Err(_) => Err(DecodeError::InvalidLength),
        }
    }
}

impl<R: Read + Send> Decoder for DelimitedDecoder<R> {
    fn decode(&mut self) -> Result<Option<MetricFamily>, DecodeError> {
        if let Some(reader) = self.reader.take() {
            self.buf = Bytes::from(read_body(reader, self.body_limit)?);
        }

        let Some(size) = self.read_length()? else {
            return Ok(None);
        };
        if size > MAX_DELIMITED_MESSAGE_BYTES {
            return Err(DecodeError::MessageTooLarge {
                size,
                limit: MAX_DELIMITED_MESSAGE_BYTES,
            });
        }
        if size > self.buf.remaining() {
            return Err(DecodeError::Truncated);
        }

        let family = MetricFamily::decode(self.buf.split_to(size))?;
        validate(&family)?;
        Ok(Some(family))
    }
}

fn validate(family: &MetricFamily) -> Result<(), DecodeError> {
    if !is_valid_metric_name(family.name()) {
        return Err(DecodeError::InvalidMetricName(family.name().to_string()));
    }
    for metric in &family.metric {
        if let Some(label) = metric.label.iter().find(|l| !is_valid_label_name(l.name())) {
            return Err(DecodeError::InvalidLabelName {
                metric: family.name().to_string(),
                label: label.name().to_string(),
            });
        }
    }
    Ok(())
}
