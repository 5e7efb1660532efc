use crate::report::finding::{Finding, FindingKind};
use chrono::{DateTime, Utc};
use model::{execution::failed_row::FailedRow, plan::mutation::RowMutation};
use serde::Serialize;

/// Overall outcome of a sync pass.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Completed,
    /// Some rows failed, but below the degraded threshold.
    Partial,
    /// The failure rate exceeded the configured threshold.
    Degraded,
    /// Nothing was written.
    DryRun,
}

impl SyncStatus {
    pub fn from_counts(failed: u64, attempted: u64, threshold: f64, dry_run: bool) -> Self {
        if dry_run {
            return SyncStatus::DryRun;
        }
        if failed == 0 {
            return SyncStatus::Completed;
        }
        let rate = failed as f64 / attempted.max(1) as f64;
        if rate > threshold {
            SyncStatus::Degraded
        } else {
            SyncStatus::Partial
        }
    }
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct StageSummary {
    pub name: String,
    pub rules: usize,
    pub mutations: usize,
    pub rows_updated: u64,
    pub rows_inserted: u64,
    pub rows_failed: u64,
}

/// Report returned by a sync pass.
#[derive(Serialize, Debug, Clone, Default)]
pub struct SyncSummary {
    pub run_id: String,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub rows_updated: u64,
    pub rows_inserted: u64,
    pub rows_failed: u64,
    pub ambiguities: usize,
    pub conflicts: usize,
    pub rules_skipped: Vec<String>,
    pub batches_written: u64,
    pub retries: u64,
    pub stages: Vec<StageSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_rows: Vec<FailedRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    /// Mutations that would be written; filled for dry runs only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<RowMutation>,
}

impl SyncSummary {
    pub fn rows_attempted(&self) -> u64 {
        self.rows_updated + self.rows_inserted + self.rows_failed
    }

    pub fn failure_rate(&self) -> f64 {
        self.rows_failed as f64 / self.rows_attempted().max(1) as f64
    }

    pub fn findings_of(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    pub fn is_degraded(&self) -> bool {
        self.status == SyncStatus::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_counts() {
        assert_eq!(SyncStatus::from_counts(0, 10, 0.2, false), SyncStatus::Completed);
        assert_eq!(SyncStatus::from_counts(2, 10, 0.2, false), SyncStatus::Partial);
        assert_eq!(SyncStatus::from_counts(3, 10, 0.2, false), SyncStatus::Degraded);
        assert_eq!(SyncStatus::from_counts(3, 10, 0.2, true), SyncStatus::DryRun);
    }

    #[test]
    fn serializes_status_in_snake_case() {
        let json = serde_json::to_value(SyncStatus::DryRun).unwrap();
        assert_eq!(json, serde_json::json!("dry_run"));
    }
}
