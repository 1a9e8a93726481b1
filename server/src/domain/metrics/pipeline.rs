//! Ingestion Pipeline
//!
//! Decodes one request body, runs the transform chain, packs the result and
//! writes it to the store. Produces exactly one [`Outcome`].

use std::sync::Arc;

use thiserror::Error;

use super::decode::{DecodeError, Decoder};
use super::family::MetricFamily;
use super::pack::pack;
use super::transform::{TransformError, Transformer, filter};
use crate::core::constants::DECODE_BATCH_CAPACITY;
use crate::data::store::{PartitionedMetrics, Store, StoreError};
use crate::domain::context::{DoneReason, RequestContext};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("error decoding metrics: {0}")]
    Decode(#[from] DecodeError),

    #[error("error transforming metrics: {0}")]
    Transform(#[from] TransformError),

    #[error("error storing metrics: {0}")]
    Store(#[from] StoreError),

    #[error("ingestion stopped: {0}")]
    Cancelled(DoneReason),
}

/// Terminal result of one ingestion attempt
#[derive(Debug)]
pub enum Outcome {
    Success,
    /// The store refused the write for this partition key
    RateLimited(String),
    Failure(IngestError),
}

impl From<Result<(), IngestError>> for Outcome {
    fn from(result: Result<(), IngestError>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(IngestError::Store(StoreError::WriteLimitReached(key))) => {
                Outcome::RateLimited(key)
            }
            Err(e) => Outcome::Failure(e),
        }
    }
}

#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn Store>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn run(
        &self,
        ctx: &RequestContext,
        partition_key: String,
        decoder: &mut dyn Decoder,
        transformer: &dyn Transformer,
    ) -> Outcome {
        self.ingest(ctx, partition_key, decoder, transformer)
            .await
            .into()
    }

    async fn ingest(
        &self,
        ctx: &RequestContext,
        partition_key: String,
        decoder: &mut dyn Decoder,
        transformer: &dyn Transformer,
    ) -> Result<(), IngestError> {
        let families = decode_all(ctx, decoder)?;
        let decoded = families.len();

        let families = pack(filter(families, transformer)?);
        tracing::debug!(
            partition_key = %partition_key,
            decoded,
            stored = families.len(),
            "Writing metrics"
        );

        self.store
            .write_metrics(ctx, PartitionedMetrics::new(partition_key, families))
            .await?;
        Ok(())
    }
}

/// Decode families until the stream ends. Any error discards what was
/// decoded so far.
pub fn decode_all(
    ctx: &RequestContext,
    decoder: &mut dyn Decoder,
) -> Result<Vec<MetricFamily>, IngestError> {
    let mut families = Vec::with_capacity(DECODE_BATCH_CAPACITY);
    loop {
        if let Some(reason) = ctx.done_reason() {
            return Err(IngestError::Cancelled(reason));
        }
        match decoder.decode()? {
            Some(family) => families.push(family),
            None => return Ok(families),
        }
    }
}
