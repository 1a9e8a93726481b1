//! Metric storage
//!
//! - `memory` - In-process store keyed by partition, with TTL pruning
//! - `ratelimited` - Decorator limiting each partition to one write per interval

mod error;
mod memory;
mod ratelimited;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use ratelimited::RateLimitedStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::context::RequestContext;
use crate::domain::metrics::MetricFamily;

/// One atomic write: every family pushed by one request for one partition
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedMetrics {
    pub partition_key: String,
    pub families: Vec<MetricFamily>,
}

impl PartitionedMetrics {
    pub fn new(partition_key: impl Into<String>, families: Vec<MetricFamily>) -> Self {
        Self {
            partition_key: partition_key.into(),
            families,
        }
    }
}

/// Storage backend for packed batches
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a batch. Implementations may observe `ctx` and give up early.
    async fn write_metrics(
        &self,
        ctx: &RequestContext,
        batch: PartitionedMetrics,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: Store + ?Sized> Store for Arc<T> {
    async fn write_metrics(
        &self,
        ctx: &RequestContext,
        batch: PartitionedMetrics,
    ) -> Result<(), StoreError> {
        (**self).write_metrics(ctx, batch).await
    }
}

/// Run `sweep` every `period` until the shutdown flag flips
fn spawn_sweeper<F>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut sweep: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => sweep(),
            }
        }
        tracing::debug!(task = name, "Sweeper stopped");
    })
}
