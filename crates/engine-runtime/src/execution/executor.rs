use crate::{error::SyncError, execution::snapshot::SnapshotCache};
use chrono::Utc;
use connectors::store::TableStore;
use engine_config::{
    report::{
        finding::Finding,
        summary::{StageSummary, SyncStatus, SyncSummary},
    },
    settings::{
        sync::SyncSettings,
        validated::{ValidatedRule, ValidatedRuleSet},
    },
};
use engine_core::metrics::Metrics;
use engine_processing::{
    planner::ChangePlanner,
    rule::executor::{RuleContext, RuleExecutor, RuleOutput},
    writer::writer::BatchWriter,
};
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run(
    store: Arc<dyn TableStore>,
    rules: &ValidatedRuleSet,
    settings: SyncSettings,
    cancel: CancellationToken,
) -> Result<SyncSummary, SyncError> {
    SyncExecutor::new(store, settings)?
        .with_cancellation(cancel)
        .run(rules)
        .await
}

/// Runs one sync pass: for each stage, fetch the snapshots its rules need,
/// evaluate the rules, plan the changes and write them back.
pub struct SyncExecutor {
    store: Arc<dyn TableStore>,
    settings: SyncSettings,
    cancel: CancellationToken,
    metrics: Metrics,
    run_id: String,
}

impl SyncExecutor {
    pub fn new(store: Arc<dyn TableStore>, settings: SyncSettings) -> Result<Self, SyncError> {
        settings.validate()?;
        Ok(Self {
            store,
            settings,
            cancel: CancellationToken::new(),
            metrics: Metrics::new(),
            run_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn run(&self, rules: &ValidatedRuleSet) -> Result<SyncSummary, SyncError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let dry_run = self.settings.dry_run;
        let baseline = self.metrics.snapshot();

        info!(
            run_id = %self.run_id,
            rules = rules.rules.len(),
            skipped = rules.skipped.len(),
            dry_run,
            "Starting sync pass"
        );

        let mut summary = SyncSummary {
            run_id: self.run_id.clone(),
            started_at,
            rules_skipped: rules.skipped.clone(),
            ..SyncSummary::default()
        };
        for name in &rules.skipped {
            warn!(rule = %name, "Rule disabled; skipping");
            summary.findings.push(Finding::new_rule_skipped(name));
        }

        let ctx = RuleContext {
            dictionary: &rules.dictionary,
            latest: &rules.latest,
        };
        let writer = BatchWriter::new(Arc::clone(&self.store), self.run_id.clone())
            .with_retry(self.settings.retry_policy())
            .with_max_concurrent(self.settings.max_concurrent)
            .with_batch_timeout(self.settings.batch_timeout)
            .with_metrics(self.metrics.clone());
        let mut cache = SnapshotCache::new();

        let stages = rules.stages();
        let total = stages.len();
        for (idx, (stage, stage_rules)) in stages.into_iter().enumerate() {
            self.ensure_active(&stage)?;
            info!(stage = %stage, rules = stage_rules.len(), "Processing stage {}/{}", idx + 1, total);

            cache
                .load(&self.store, &tables_for(&stage_rules), self.settings.max_concurrent)
                .await?;

            let outputs: Vec<RuleOutput> = stage_rules
                .iter()
                .map(|rule| {
                    let source = rule
                        .rule
                        .source_table
                        .as_deref()
                        .map(|t| cache.get(t))
                        .unwrap_or(&[]);
                    let target = cache.get(&rule.rule.target_table);
                    RuleExecutor::new(rule, ctx).execute(source, target)
                })
                .collect();

            let plan = ChangePlanner::new(cache.tables()).plan(&outputs);

            let mut stage_summary = StageSummary {
                name: stage.clone(),
                rules: stage_rules.len(),
                mutations: plan.len(),
                ..StageSummary::default()
            };
            for output in outputs {
                summary.ambiguities += output.ambiguities;
                summary.findings.extend(output.findings);
            }
            summary.conflicts += plan.conflicts;
            summary.findings.extend(plan.findings.iter().cloned());

            if dry_run {
                info!(stage = %stage, mutations = plan.len(), "Dry run; nothing written");
                summary.planned.extend(plan.mutations);
                summary.stages.push(stage_summary);
                continue;
            }

            // In-flight batches cannot be cancelled; this is the last exit.
            self.ensure_active(&stage)?;
            let report = writer.write_all(&plan.mutations).await;

            stage_summary.rows_updated = report.rows_updated;
            stage_summary.rows_inserted = report.rows_inserted;
            stage_summary.rows_failed = report.rows_failed();
            info!(
                stage = %stage,
                updated = report.rows_updated,
                inserted = report.rows_inserted,
                failed = report.rows_failed(),
                "Stage written"
            );

            cache.invalidate(plan.tables());
            summary.findings.extend(report.findings);
            summary.failed_rows.extend(report.failed_rows);
            summary.stages.push(stage_summary);
        }

        let counts = self.metrics.snapshot().since(&baseline);
        summary.rows_updated = counts.rows_updated;
        summary.rows_inserted = counts.rows_inserted;
        summary.rows_failed = counts.rows_failed;
        summary.batches_written = counts.batches_written;
        summary.retries = counts.retry_count;
        summary.status = SyncStatus::from_counts(
            counts.rows_failed,
            counts.rows_attempted(),
            self.settings.degraded_threshold,
            dry_run,
        );
        summary.finished_at = Utc::now();
        summary.duration_ms = start.elapsed().as_millis() as u64;

        match summary.status {
            SyncStatus::Degraded => warn!(
                run_id = %self.run_id,
                failed = summary.rows_failed,
                attempted = summary.rows_attempted(),
                "Sync pass degraded"
            ),
            status => info!(
                run_id = %self.run_id,
                status = ?status,
                updated = summary.rows_updated,
                inserted = summary.rows_inserted,
                failed = summary.rows_failed,
                duration_ms = summary.duration_ms,
                "Sync pass finished"
            ),
        }
        Ok(summary)
    }

    fn ensure_active(&self, stage: &str) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            warn!(run_id = %self.run_id, stage = %stage, "Cancellation requested; stopping before write");
            return Err(SyncError::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}

/// Every table a stage reads, sources first, without duplicates.
fn tables_for(rules: &[&ValidatedRule]) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    let names = rules.iter().flat_map(|r| {
        let source = r.rule.source_table.clone().filter(|_| !is_broadcast(r));
        source.into_iter().chain(std::iter::once(r.rule.target_table.clone()))
    });
    for name in names {
        if !tables.contains(&name) {
            tables.push(name);
        }
    }
    tables
}

fn is_broadcast(rule: &ValidatedRule) -> bool {
    !rule.rule.is_multi_field() && !rule.rule.aggregation.is_keyed()
}
