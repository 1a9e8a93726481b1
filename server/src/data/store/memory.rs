//! In-memory store using dashmap
//!
//! Each partition holds the most recent batch pushed for it. Partitions that
//! stop pushing are evicted by a background prune task after a TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{PartitionedMetrics, Store, StoreError, spawn_sweeper};
use crate::domain::context::RequestContext;
use crate::domain::metrics::MetricFamily;

struct Partition {
    families: Vec<MetricFamily>,
    updated_at: Instant,
}

#[derive(Default)]
pub struct MemoryStore {
    partitions: DashMap<String, Partition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest batch stored for `key`
    pub fn partition(&self, key: &str) -> Option<Vec<MetricFamily>> {
        self.partitions.get(key).map(|p| p.families.clone())
    }

    /// Snapshot of every partition, ordered by key
    pub fn read_metrics(&self) -> Vec<PartitionedMetrics> {
        let mut out: Vec<_> = self
            .partitions
            .iter()
            .map(|entry| PartitionedMetrics::new(entry.key().clone(), entry.families.clone()))
            .collect();
        out.sort_by(|a, b| a.partition_key.cmp(&b.partition_key));
        out
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Drop partitions not written within `ttl`. Returns how many were removed.
    pub fn prune(&self, ttl: Duration) -> usize {
        let before = self.partitions.len();
        let now = Instant::now();
        self.partitions
            .retain(|_, p| now.saturating_duration_since(p.updated_at) < ttl);
        before.saturating_sub(self.partitions.len())
    }

    /// Periodically prune stale partitions until shutdown
    pub fn start_prune_task(
        self: Arc<Self>,
        ttl: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let period = (ttl / 2).max(Duration::from_secs(1));
        spawn_sweeper("partition-prune", period, shutdown_rx, move || {
            let removed = self.prune(ttl);
            if removed > 0 {
                tracing::debug!(removed, remaining = self.len(), "Pruned stale partitions");
            }
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn write_metrics(
        &self,
        ctx: &RequestContext,
        batch: PartitionedMetrics,
    ) -> Result<(), StoreError> {
        if let Some(reason) = ctx.done_reason() {
            return Err(StoreError::Cancelled(reason.to_string()));
        }

        let families = batch.families.len();
        self.partitions.insert(
            batch.partition_key.clone(),
            Partition {
                families: batch.families,
                updated_at: Instant::now(),
            },
        );
        tracing::debug!(partition_key = %batch.partition_key, families, "Stored partition");
        Ok(())
    }
}
