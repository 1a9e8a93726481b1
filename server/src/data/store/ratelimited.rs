//! Per-partition write rate limiting
//!
//! Wraps any [`Store`] and admits at most one write per partition within a
//! fixed interval. Rejected writes fail with
//! [`StoreError::WriteLimitReached`] carrying the partition key, which the
//! upload endpoint turns into a 429.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{PartitionedMetrics, Store, StoreError, spawn_sweeper};
use crate::domain::context::RequestContext;

pub struct RateLimitedStore<S> {
    inner: S,
    interval: Duration,
    last_write: DashMap<String, Instant>,
}

impl<S: Store> RateLimitedStore<S> {
    pub fn new(inner: S, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last_write: DashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of partitions currently inside their write window
    pub fn tracked(&self) -> usize {
        self.last_write.len()
    }

    /// Forget partitions whose window has elapsed; they would be admitted
    /// anyway. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.last_write.len();
        let now = Instant::now();
        self.last_write
            .retain(|_, last| now.saturating_duration_since(*last) < self.interval);
        before.saturating_sub(self.last_write.len())
    }

    /// Claim the write slot for `key`. Returns the previous slot so it can be
    /// restored if the inner write fails.
    fn reserve(&self, key: &str, now: Instant) -> Result<Option<Instant>, StoreError> {
        match self.last_write.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                let last = *e.get();
                if now.saturating_duration_since(last) < self.interval {
                    return Err(StoreError::WriteLimitReached(key.to_string()));
                }
                e.insert(now);
                Ok(Some(last))
            }
            Entry::Vacant(e) => {
                e.insert(now);
                Ok(None)
            }
        }
    }

    fn release(&self, key: &str, reserved: Instant, previous: Option<Instant>) {
        if let Entry::Occupied(mut e) = self.last_write.entry(key.to_string()) {
            if *e.get() != reserved {
                return;
            }
            match previous {
                Some(prev) => {
                    e.insert(prev);
                }
                None => {
                    e.remove();
                }
            }
        }
    }
}

impl<S: Store + 'static> RateLimitedStore<S> {
    /// Periodically drop elapsed windows until shutdown
    pub fn start_prune_task(self: Arc<Self>, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = self.interval.max(Duration::from_secs(1));
        spawn_sweeper("rate-limit-prune", period, shutdown_rx, move || {
            let removed = self.prune();
            if removed > 0 {
                tracing::debug!(removed, remaining = self.tracked(), "Pruned rate limit windows");
            }
        })
    }
}

#[async_trait]
impl<S: Store> Store for RateLimitedStore<S> {
    async fn write_metrics(
        &self,
        ctx: &RequestContext,
        batch: PartitionedMetrics,
    ) -> Result<(), StoreError> {
        let key = batch.partition_key.clone();
        let now = Instant::now();
        let previous = self.reserve(&key, now)?;

        let result = self.inner.write_metrics(ctx, batch).await;
        if result.is_err() {
            self.release(&key, now, previous);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{MetricFamily, MetricType};
    use parking_lot::Mutex;

    /// Counts writes; fails when `fail` is set
    #[derive(Default, Clone)]
    struct MockStore {
        writes: Arc<Mutex<Vec<String>>>,
        fail: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl Store for MockStore {
        async fn write_metrics(
            &self,
            _ctx: &RequestContext,
            batch: PartitionedMetrics,
        ) -> Result<(), StoreError> {
            if *self.fail.lock() {
                return Err(StoreError::Backend("boom".to_string()));
            }
            self.writes.lock().push(batch.partition_key);
            Ok(())
        }
    }

    fn batch(key: &str) -> PartitionedMetrics {
        PartitionedMetrics::new(key, vec![MetricFamily::new("up", MetricType::Gauge)])
    }

    fn limited(mock: &MockStore) -> RateLimitedStore<MockStore> {
        RateLimitedStore::new(mock.clone(), Duration::from_secs(270))
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_write_within_interval_rejected() {
        let mock = MockStore::default();
        let store = limited(&mock);
        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));

        store.write_metrics(&ctx, batch("a")).await.unwrap();
        let err = store.write_metrics(&ctx, batch("a")).await.unwrap_err();

        assert_eq!(err, StoreError::WriteLimitReached("a".to_string()));
        assert_eq!(*mock.writes.lock(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_keys_unaffected() {
        let mock = MockStore::default();
        let store = limited(&mock);
        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));

        store.write_metrics(&ctx, batch("a")).await.unwrap();
        store.write_metrics(&ctx, batch("b")).await.unwrap();
        assert_eq!(mock.writes.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_allowed_after_interval() {
        let mock = MockStore::default();
        let store = limited(&mock);

        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));
        store.write_metrics(&ctx, batch("a")).await.unwrap();

        tokio::time::advance(store.interval()).await;
        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));
        store.write_metrics(&ctx, batch("a")).await.unwrap();
        assert_eq!(mock.writes.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_releases_slot() {
        let mock = MockStore::default();
        let store = limited(&mock);
        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));

        *mock.fail.lock() = true;
        assert!(matches!(
            store.write_metrics(&ctx, batch("a")).await,
            Err(StoreError::Backend(_))
        ));

        *mock.fail.lock() = false;
        store.write_metrics(&ctx, batch("a")).await.unwrap();
        assert_eq!(*mock.writes.lock(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_forgets_elapsed_windows() {
        let mock = MockStore::default();
        let store = limited(&mock);
        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));

        for i in 0..1000 {
            store.write_metrics(&ctx, batch(&format!("edge-{i}"))).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        store.write_metrics(&ctx, batch("recent")).await.unwrap();
        assert_eq!(store.tracked(), 1001);

        tokio::time::advance(Duration::from_secs(3600)).await;
        store.write_metrics(&ctx, batch("fresh")).await.unwrap();

        assert_eq!(store.prune(), 1001);
        assert_eq!(store.tracked(), 1);
        // The live window still rejects
        assert!(store.write_metrics(&ctx, batch("fresh")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_keeps_open_windows() {
        let mock = MockStore::default();
        let store = limited(&mock);
        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));

        store.write_metrics(&ctx, batch("a")).await.unwrap();
        tokio::time::advance(Duration::from_secs(100)).await;

        assert_eq!(store.prune(), 0);
        assert_eq!(
            store.write_metrics(&ctx, batch("a")).await,
            Err(StoreError::WriteLimitReached("a".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_task_sweeps_and_stops() {
        let mock = MockStore::default();
        let store = Arc::new(limited(&mock));
        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));
        store.write_metrics(&ctx, batch("a")).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = store.clone().start_prune_task(rx);

        tokio::time::sleep(store.interval() * 2 + Duration::from_secs(1)).await;
        assert_eq!(store.tracked(), 0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
