use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    pages_fetched: AtomicU64,
    amounts_extracted: AtomicU64,
    retry_count: AtomicU64,
    checkpoint_writes: AtomicU64,
    checkpoint_failures: AtomicU64,
}

/// Counters for one harvester; clones share the same counters.
#[derive(Debug, Clone)]
pub struct HarvestMetrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pages_fetched: u64,
    pub amounts_extracted: u64,
    pub retry_count: u64,
    pub checkpoint_writes: u64,
    pub checkpoint_failures: u64,
}

impl HarvestMetrics {
    pub fn new() -> Self {
        HarvestMetrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_pages(&self, count: u64) {
        self.inner.pages_fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_amounts(&self, count: u64) {
        self.inner
            .amounts_extracted
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_checkpoint_writes(&self, count: u64) {
        self.inner
            .checkpoint_writes
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_checkpoint_failures(&self, count: u64) {
        self.inner
            .checkpoint_failures
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_fetched: self.inner.pages_fetched.load(Ordering::Relaxed),
            amounts_extracted: self.inner.amounts_extracted.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
            checkpoint_writes: self.inner.checkpoint_writes.load(Ordering::Relaxed),
            checkpoint_failures: self.inner.checkpoint_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for HarvestMetrics {
    fn default() -> Self {
        Self::new()
    }
}
