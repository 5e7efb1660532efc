#[cfg(test)]
mod tests {
    use crate::{
        Fault, FaultyStore,
        utils::{cell, fast_settings, row, rules, text},
    };
    use connectors::{error::StoreError, memory::MemoryStore};
    use engine_config::{
        report::{finding::FindingKind, summary::SyncStatus},
        settings::{sync::SyncSettings, validated::ValidatedRuleSet},
    };
    use engine_runtime::{error::SyncError, execution::executor::run};
    use model::{core::value::Value, execution::failed_row::FailureStage};
    use serde_json::json;
    use std::{sync::Arc, time::Duration};
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    const SOURCE: &str = "回款明细";

    /// A source table with one row per key and a target table keyed the same
    /// way whose totals are all stale.
    async fn ledger(tables: &[(&str, usize)]) -> MemoryStore {
        let mut store = MemoryStore::new();
        let mut source = Vec::new();
        for (table, rows) in tables {
            let targets = (0..*rows)
                .map(|i| {
                    row(&format!("{table}-{i}"), &[
                        ("编号", text(&format!("{table}{i}"))),
                        ("回款", Value::Int(0)),
                    ])
                })
                .collect();
            store = store.with_table(*table, targets).await;
            source.extend((0..*rows).map(|i| {
                row(&format!("s-{table}-{i}"), &[
                    ("编号", text(&format!("{table}{i}"))),
                    ("金额", Value::Int(i as i64 + 1)),
                ])
            }));
        }
        store.with_table(SOURCE, source).await
    }

    fn ledger_rules(tables: &[&str]) -> ValidatedRuleSet {
        let sync_rules: Vec<_> = tables
            .iter()
            .map(|table| {
                json!({
                    "name": format!("{table}回款"),
                    "source_table": SOURCE, "target_table": table,
                    "source_keys": ["编号"], "target_keys": ["编号"],
                    "source_fields": ["金额"], "target_fields": ["回款"],
                    "aggregation": "sum"
                })
            })
            .collect();
        rules(json!({ "sync_rules": sync_rules }))
    }

    async fn run_faulty(
        store: &Arc<FaultyStore>,
        rules: &ValidatedRuleSet,
        settings: SyncSettings,
    ) -> Result<engine_config::report::summary::SyncSummary, SyncError> {
        run(store.clone(), rules, settings, CancellationToken::new()).await
    }

    // Test Settings: one target table of 10 rows, the store locks row 台账-3.
    // Scenario: The batch is accepted but one row comes back as failed.
    // Expected Outcome: Nine updates, one failed row with the store's reason,
    // status partial.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejected_row_makes_the_pass_partial() {
        let store = Arc::new(FaultyStore::new(ledger(&[("台账", 10)]).await).reject_row("台账-3"));

        let summary = run_faulty(&store, &ledger_rules(&["台账"]), fast_settings())
            .await
            .unwrap();

        assert_eq!(summary.status, SyncStatus::Partial);
        assert_eq!(summary.rows_updated, 9);
        assert_eq!(summary.rows_failed, 1);
        let failed = &summary.failed_rows[0];
        assert_eq!(failed.target, "台账-3");
        assert_eq!(failed.stage, FailureStage::Rejected);
        assert_eq!(failed.error.message, "row is locked");
        assert_eq!(summary.findings_of(FindingKind::WriteFailure).count(), 1);
        assert_eq!(cell(store.inner(), "台账", "台账-3", "回款").await, Value::Int(0));
        assert_eq!(cell(store.inner(), "台账", "台账-4", "回款").await, Value::Int(5));
    }

    // Test Settings: two target tables of 5 rows, every write to 应收 is refused.
    // Scenario: The refusal is not retryable.
    // Expected Outcome: 应收 rows fail after one attempt, 实收 is still written,
    // and half the rows failing marks the pass as degraded.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fatal_table_failure_does_not_stop_other_tables() {
        let store = Arc::new(
            FaultyStore::new(ledger(&[("应收", 5), ("实收", 5)]).await).fail_table("应收", Fault::Fatal),
        );

        let summary = run_faulty(&store, &ledger_rules(&["应收", "实收"]), fast_settings())
            .await
            .unwrap();

        assert_eq!(summary.status, SyncStatus::Degraded);
        assert!(summary.is_degraded());
        assert_eq!(summary.rows_updated, 5);
        assert_eq!(summary.rows_failed, 5);
        assert_eq!(summary.retries, 0);
        assert!(summary.failed_rows.iter().all(|f| f.table == "应收"
            && f.stage == FailureStage::BatchFatal
            && f.error.error_type == "rejected"
            && !f.error.is_retryable
            && f.metadata.attempts == Some(1)));
        assert_eq!(cell(store.inner(), "实收", "实收-0", "回款").await, Value::Int(1));
        assert!(logs_contain("Batch failed"));
    }

    // Test Settings: the first two write calls fail with a transport error,
    // three attempts allowed.
    // Scenario: The single batch is retried.
    // Expected Outcome: Every row is written and two retries are reported.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transient_failures_are_retried() {
        let store = Arc::new(FaultyStore::new(ledger(&[("台账", 10)]).await).fail_first(2));

        let summary = run_faulty(&store, &ledger_rules(&["台账"]), fast_settings().with_max_attempts(3))
            .await
            .unwrap();

        assert_eq!(summary.status, SyncStatus::Completed);
        assert_eq!(summary.rows_updated, 10);
        assert_eq!(summary.retries, 2);
        assert_eq!(store.write_calls(), 3);
    }

    // Test Settings: every write is rate limited, two attempts allowed.
    // Expected Outcome: The batch is exhausted and its rows are reported as
    // retryable failures.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn exhausted_retries_fail_the_batch() {
        let store = Arc::new(
            FaultyStore::new(ledger(&[("台账", 4)]).await).fail_table("台账", Fault::Transient),
        );

        let summary = run_faulty(&store, &ledger_rules(&["台账"]), fast_settings().with_max_attempts(2))
            .await
            .unwrap();

        assert_eq!(summary.rows_failed, 4);
        assert_eq!(summary.rows_updated, 0);
        assert_eq!(store.write_calls(), 2);
        let failed = &summary.failed_rows[0];
        assert_eq!(failed.stage, FailureStage::BatchExhausted);
        assert_eq!(failed.error.error_type, "rate_limited");
        assert!(failed.error.is_retryable);
        assert_eq!(failed.metadata.attempts, Some(2));
        assert!(failed.metadata.batch_id.as_deref().is_some_and(|id| id.starts_with("bat-")));
    }

    // Test Settings: 300 rows (10 batches of 30), every write sleeps 20ms,
    // at most 3 batches in flight.
    // Expected Outcome: All rows are written and the store never sees more
    // than 3 concurrent writes.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn write_concurrency_is_bounded() {
        let store = Arc::new(
            FaultyStore::new(ledger(&[("台账", 300)]).await).with_delay(Duration::from_millis(20)),
        );

        let summary = run_faulty(&store, &ledger_rules(&["台账"]), fast_settings().with_max_concurrent(3))
            .await
            .unwrap();

        assert_eq!(summary.rows_updated, 300);
        assert_eq!(summary.batches_written, 10);
        assert_eq!(store.write_calls(), 10);
        assert!(store.max_in_flight() <= 3, "saw {} writes in flight", store.max_in_flight());
        assert!(store.max_in_flight() > 1);
    }

    // Test Settings: writes take 200ms, the batch deadline is 20ms, one attempt.
    // Expected Outcome: The batch fails with a timeout.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_batches_time_out() {
        let store = Arc::new(
            FaultyStore::new(ledger(&[("台账", 3)]).await).with_delay(Duration::from_millis(200)),
        );
        let settings = fast_settings()
            .with_max_attempts(1)
            .with_batch_timeout(Duration::from_millis(20));

        let summary = run_faulty(&store, &ledger_rules(&["台账"]), settings).await.unwrap();

        assert_eq!(summary.rows_failed, 3);
        assert!(summary.failed_rows.iter().all(|f| f.error.error_type == "timeout"));
        assert_eq!(cell(store.inner(), "台账", "台账-0", "回款").await, Value::Int(0));
    }

    // Scenario: A rule reads a source table the store does not have.
    // Expected Outcome: The pass aborts with a fetch error before writing.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_source_table_aborts_the_pass() {
        let store = Arc::new(FaultyStore::new(ledger(&[("台账", 2)]).await));
        let rs = rules(json!({ "sync_rules": [{
            "source_table": "不存在", "target_table": "台账",
            "source_keys": ["编号"], "target_keys": ["编号"],
            "source_fields": ["金额"], "target_fields": ["回款"]
        }]}));

        let err = run_faulty(&store, &rs, fast_settings()).await.unwrap_err();

        match err {
            SyncError::Fetch { table, source } => {
                assert_eq!(table, "不存在");
                assert!(matches!(source, StoreError::TableNotFound(_)));
            }
            other => panic!("expected a fetch error, got {other:?}"),
        }
        assert_eq!(store.write_calls(), 0);
    }

    // Scenario: The pass is cancelled before it starts.
    // Expected Outcome: Nothing is written and the caller sees the cancellation.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_pass_writes_nothing() {
        let store = Arc::new(FaultyStore::new(ledger(&[("台账", 5)]).await));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run(store.clone(), &ledger_rules(&["台账"]), fast_settings(), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Cancelled { .. }));
        assert_eq!(store.write_calls(), 0);
    }

    // Scenario: A dry run over stale totals.
    // Expected Outcome: The plan lists every update and the store is untouched.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dry_run_reports_the_plan() {
        let store = Arc::new(FaultyStore::new(ledger(&[("台账", 4)]).await));

        let summary = run_faulty(&store, &ledger_rules(&["台账"]), fast_settings().with_dry_run(true))
            .await
            .unwrap();

        assert_eq!(summary.status, SyncStatus::DryRun);
        assert_eq!(summary.planned.len(), 4);
        assert_eq!(store.write_calls(), 0);
    }
}
