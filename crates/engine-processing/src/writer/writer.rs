use crate::{error::WriteError, retry::classify_store_error, writer::batch_size::batch_size_for};
use connectors::{error::StoreError, store::TableStore};
use engine_config::report::finding::Finding;
use engine_core::{metrics::Metrics, retry::RetryPolicy};
use futures::{StreamExt, stream};
use model::{
    execution::failed_row::{FailedRow, FailureStage},
    plan::mutation::RowMutation,
    records::batch::{WriteBatch, WriteOutcome},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::time::timeout;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one batch after retries.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub batch_id: String,
    pub table: String,
    pub rows_updated: u64,
    pub rows_inserted: u64,
    pub failed_rows: Vec<FailedRow>,
    pub attempts: usize,
    pub error: Option<String>,
}

/// Aggregate outcome of a write phase.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub rows_updated: u64,
    pub rows_inserted: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    pub retries: u64,
    pub failed_rows: Vec<FailedRow>,
    pub findings: Vec<Finding>,
}

impl WriteReport {
    pub fn rows_failed(&self) -> u64 {
        self.failed_rows.len() as u64
    }

    pub fn rows_attempted(&self) -> u64 {
        self.rows_updated + self.rows_inserted + self.rows_failed()
    }

    fn absorb(&mut self, result: BatchResult) {
        self.rows_updated += result.rows_updated;
        self.rows_inserted += result.rows_inserted;
        self.retries += result.attempts.saturating_sub(1) as u64;
        if result.error.is_some() {
            self.batches_failed += 1;
        } else {
            self.batches_written += 1;
        }
        for row in &result.failed_rows {
            self.findings.push(Finding::new_write_failed(
                &row.table,
                &row.target,
                &row.error.message,
            ));
        }
        self.failed_rows.extend(result.failed_rows);
    }
}

/// Writes row mutations back to the store in size-adaptive batches.
///
/// Batches are dispatched with at most `max_concurrent` in flight. Each call
/// is bounded by `batch_timeout`; a timeout counts as a transient failure and
/// goes through the retry policy like any other. A batch that still fails is
/// reported row by row and never stops the remaining batches.
pub struct BatchWriter {
    store: Arc<dyn TableStore>,
    retry: RetryPolicy,
    max_concurrent: usize,
    batch_timeout: Duration,
    metrics: Metrics,
    run_id: String,
    /// Batch sequence across every `partition` call of this writer.
    next_seq: AtomicUsize,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn TableStore>, run_id: impl Into<String>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            metrics: Metrics::new(),
            run_id: run_id.into(),
            next_seq: AtomicUsize::new(0),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Splits mutations per table, keeping plan order, into batches sized by
    /// the table's mutation count.
    pub fn partition(&self, mutations: &[RowMutation]) -> Vec<WriteBatch> {
        let mut tables: Vec<(&str, Vec<&RowMutation>)> = Vec::new();
        for m in mutations {
            match tables.iter_mut().find(|(t, _)| *t == m.table) {
                Some((_, rows)) => rows.push(m),
                None => tables.push((m.table.as_str(), vec![m])),
            }
        }

        let mut batches = Vec::new();
        for (table, rows) in tables {
            let size = batch_size_for(rows.len());
            for chunk in rows.chunks(size) {
                let id = self.batch_id(table, self.next_seq.fetch_add(1, Ordering::Relaxed));
                let writes = chunk.iter().map(|m| m.to_write()).collect();
                batches.push(WriteBatch::new(id, table, writes));
            }
        }
        batches
    }

    pub async fn write_all(&self, mutations: &[RowMutation]) -> WriteReport {
        let batches = self.partition(mutations);
        let mut report = WriteReport::default();
        if batches.is_empty() {
            return report;
        }

        info!(
            run_id = %self.run_id,
            batches = batches.len(),
            rows = mutations.len(),
            max_concurrent = self.max_concurrent,
            "Dispatching write batches"
        );

        let mut results: Vec<(usize, BatchResult)> = stream::iter(
            batches
                .iter()
                .enumerate()
                .map(|(seq, b)| async move { (seq, self.write_batch(b).await) }),
        )
        .buffer_unordered(self.max_concurrent)
        .collect()
        .await;

        // Completion order is arbitrary; report in plan order.
        results.sort_by_key(|(seq, _)| *seq);
        for (_, result) in results {
            report.absorb(result);
        }
        report
    }

    pub async fn write_batch(&self, batch: &WriteBatch) -> BatchResult {
        let start = Instant::now();
        let limit = self.batch_timeout;
        let mut result = BatchResult {
            batch_id: batch.id.clone(),
            table: batch.table.clone(),
            ..BatchResult::default()
        };

        let outcome = self
            .retry
            .run(
                || {
                    let store = Arc::clone(&self.store);
                    async move {
                        match timeout(limit, store.write_rows(&batch.table, &batch.rows)).await {
                            Ok(res) => res,
                            Err(_) => Err(StoreError::Timeout(limit)),
                        }
                    }
                },
                classify_store_error,
            )
            .await;

        match outcome {
            Ok(done) => {
                result.attempts = done.attempts;
                self.record_outcomes(batch, done.value, done.attempts, &mut result);
                self.metrics.increment_batches(1);

                let duration = start.elapsed();
                let written = result.rows_updated + result.rows_inserted;
                info!(
                    batch_id = %batch.id,
                    table = %batch.table,
                    rows = written,
                    failed = result.failed_rows.len(),
                    attempts = done.attempts,
                    duration_ms = duration.as_millis(),
                    rows_per_sec = %format!("{:.2}", written as f64 / duration.as_secs_f64().max(f64::EPSILON)),
                    "Batch written"
                );
            }
            Err(err) => {
                let err = WriteError::from_retry(batch.id.clone(), err);
                result.attempts = err.attempts();
                error!(
                    batch_id = %batch.id,
                    table = %batch.table,
                    rows = batch.len(),
                    attempts = err.attempts(),
                    error = %err,
                    "Batch failed"
                );

                for (i, write) in batch.rows.iter().enumerate() {
                    result.failed_rows.push(
                        FailedRow::new(&batch.table, write, err.stage(), err.error_type(), err.to_string())
                            .with_execution_context(&self.run_id, &batch.id, i)
                            .with_attempts(err.attempts() as u32)
                            .with_retryable(err.is_retryable()),
                    );
                }
                self.metrics.increment_failed_batches(1);
                self.metrics.increment_failed(batch.len() as u64);
                result.error = Some(err.to_string());
            }
        }

        self.metrics
            .increment_retries(result.attempts.saturating_sub(1) as u64);
        result
    }

    fn record_outcomes(
        &self,
        batch: &WriteBatch,
        outcomes: Vec<WriteOutcome>,
        attempts: usize,
        result: &mut BatchResult,
    ) {
        let mut outcomes = outcomes.into_iter();
        for (i, write) in batch.rows.iter().enumerate() {
            let reason = match outcomes.next() {
                Some(WriteOutcome::Written { .. }) => {
                    if write.is_insert() {
                        result.rows_inserted += 1;
                    } else {
                        result.rows_updated += 1;
                    }
                    continue;
                }
                Some(WriteOutcome::Failed { reason }) => reason,
                None => "store returned no outcome for this row".to_string(),
            };

            warn!(batch_id = %batch.id, table = %batch.table, row = %write.label(), reason = %reason, "Row rejected");
            result.failed_rows.push(
                FailedRow::new(&batch.table, write, FailureStage::Rejected, "rejected", reason)
                    .with_execution_context(&self.run_id, &batch.id, i)
                    .with_attempts(attempts as u32),
            );
        }

        self.metrics.increment_updated(result.rows_updated);
        self.metrics.increment_inserted(result.rows_inserted);
        self.metrics.increment_failed(result.failed_rows.len() as u64);
    }

    /// Deterministic for a given run id, table and sequence number.
    fn batch_id(&self, table: &str, seq: usize) -> String {
        let mut h = blake3::Hasher::new();
        h.update(self.run_id.as_bytes());
        h.update(b":");
        h.update(table.as_bytes());
        h.update(b":");
        h.update(seq.to_string().as_bytes());
        format!("bat-{}", &h.finalize().to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::memory::MemoryStore;
    use model::{
        core::value::FieldValue,
        plan::mutation::RowTarget,
        records::{batch::RowWrite, key::RowKey, row::Row},
    };

    fn update(id: &str, amount: i64) -> RowMutation {
        RowMutation {
            table: "汇总".into(),
            target: RowTarget::Existing { row_id: id.into() },
            fields: vec![FieldValue::new("合计", amount)],
            rules: vec!["r".into()],
        }
    }

    fn insert(key: &str) -> RowMutation {
        RowMutation {
            table: "汇总".into(),
            target: RowTarget::New {
                key_fields: vec!["编号".into()],
                key: RowKey(vec![key.into()]),
            },
            fields: vec![FieldValue::new("编号", key)],
            rules: vec!["r".into()],
        }
    }

    async fn store_with(ids: &[&str]) -> MemoryStore {
        let rows = ids
            .iter()
            .map(|id| Row::with_id(*id, vec![FieldValue::new("合计", 0)]))
            .collect();
        MemoryStore::new().with_table("汇总", rows).await
    }

    /// Fails the first `failures` calls with a transient error.
    struct Flaky {
        inner: MemoryStore,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TableStore for Flaky {
        async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
            self.inner.fetch_rows(table).await
        }

        async fn write_rows(
            &self,
            table: &str,
            rows: &[RowWrite],
        ) -> Result<Vec<WriteOutcome>, StoreError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(StoreError::Transport("connection reset".into()));
            }
            self.inner.write_rows(table, rows).await
        }
    }

    #[test]
    fn partition_uses_volume_thresholds() {
        let writer = BatchWriter::new(Arc::new(MemoryStore::new()), "run");
        let small: Vec<RowMutation> = (0..45).map(|i| update(&format!("t{i}"), 1)).collect();
        let sizes: Vec<usize> = writer.partition(&small).iter().map(WriteBatch::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);

        let large: Vec<RowMutation> = (0..501).map(|i| update(&format!("t{i}"), 1)).collect();
        assert_eq!(writer.partition(&large)[0].len(), 50);
    }

    #[test]
    fn batch_ids_are_stable_per_run() {
        let a = BatchWriter::new(Arc::new(MemoryStore::new()), "run-1");
        let b = BatchWriter::new(Arc::new(MemoryStore::new()), "run-1");
        let mutations = vec![update("t1", 1)];
        assert_eq!(a.partition(&mutations)[0].id, b.partition(&mutations)[0].id);
    }

    #[tokio::test]
    async fn writes_updates_and_inserts() {
        let store = store_with(&["t1", "t2"]).await;
        let writer = BatchWriter::new(Arc::new(store.clone()), "run");

        let report = writer
            .write_all(&[update("t1", 5), update("t2", 6), insert("N1")])
            .await;

        assert_eq!(report.rows_updated, 2);
        assert_eq!(report.rows_inserted, 1);
        assert_eq!(report.rows_failed(), 0);
        assert_eq!(report.batches_written, 1);
        assert_eq!(store.table("汇总").await.unwrap().len(), 3);
        assert_eq!(writer.metrics().snapshot().rows_updated, 2);
    }

    #[tokio::test]
    async fn rejected_rows_do_not_fail_the_batch() {
        let store = store_with(&["t1"]).await;
        let writer = BatchWriter::new(Arc::new(store), "run");

        let report = writer.write_all(&[update("t1", 5), update("gone", 6)]).await;
        assert_eq!(report.rows_updated, 1);
        assert_eq!(report.rows_failed(), 1);
        assert_eq!(report.failed_rows[0].stage, FailureStage::Rejected);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.batches_failed, 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let flaky = Flaky {
            inner: store_with(&["t1"]).await,
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let writer = BatchWriter::new(Arc::new(flaky), "run").with_retry(RetryPolicy::immediate(3));

        let report = writer.write_all(&[update("t1", 5)]).await;
        assert_eq!(report.rows_updated, 1);
        assert_eq!(report.retries, 2);
    }

    #[tokio::test]
    async fn exhausted_batches_report_every_row() {
        let flaky = Flaky {
            inner: store_with(&["t1", "t2"]).await,
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let writer = BatchWriter::new(Arc::new(flaky), "run").with_retry(RetryPolicy::immediate(2));

        let report = writer.write_all(&[update("t1", 5), update("t2", 6)]).await;
        assert_eq!(report.rows_failed(), 2);
        assert_eq!(report.batches_failed, 1);
        assert!(report.failed_rows.iter().all(|r| r.stage == FailureStage::BatchExhausted));
        assert!(report.failed_rows.iter().all(|r| r.error.is_retryable));
        assert_eq!(report.failed_rows[0].metadata.attempts, Some(2));
    }
}
