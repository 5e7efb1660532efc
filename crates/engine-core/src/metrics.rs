use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    rows_updated: AtomicU64,
    rows_inserted: AtomicU64,
    rows_failed: AtomicU64,
    batches_written: AtomicU64,
    batches_failed: AtomicU64,
    retry_count: AtomicU64,
}

/// Write-phase counters shared between concurrently running batches.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rows_updated: u64,
    pub rows_inserted: u64,
    pub rows_failed: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    pub retry_count: u64,
}

impl MetricsSnapshot {
    pub fn rows_attempted(&self) -> u64 {
        self.rows_updated + self.rows_inserted + self.rows_failed
    }

    /// Counters accumulated since `earlier`.
    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_updated: self.rows_updated - earlier.rows_updated,
            rows_inserted: self.rows_inserted - earlier.rows_inserted,
            rows_failed: self.rows_failed - earlier.rows_failed,
            batches_written: self.batches_written - earlier.batches_written,
            batches_failed: self.batches_failed - earlier.batches_failed,
            retry_count: self.retry_count - earlier.retry_count,
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_updated(&self, count: u64) {
        self.inner.rows_updated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_inserted(&self, count: u64) {
        self.inner.rows_inserted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_failed(&self, count: u64) {
        self.inner.rows_failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batches(&self, count: u64) {
        self.inner
            .batches_written
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_failed_batches(&self, count: u64) {
        self.inner.batches_failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_updated: self.inner.rows_updated.load(Ordering::Relaxed),
            rows_inserted: self.inner.rows_inserted.load(Ordering::Relaxed),
            rows_failed: self.inner.rows_failed.load(Ordering::Relaxed),
            batches_written: self.inner.batches_written.load(Ordering::Relaxed),
            batches_failed: self.inner.batches_failed.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
