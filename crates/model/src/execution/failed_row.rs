use crate::{core::value::FieldValue, records::batch::RowWrite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A target row whose write did not succeed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRow {
    pub id: String,
    pub table: String,
    /// Existing row id, or `new:<key>` for inserts.
    pub target: String,
    pub stage: FailureStage,
    pub fields: Vec<FieldValue>,
    pub error: FailureError,
    pub metadata: FailureMetadata,
    pub failed_at: DateTime<Utc>,
}

/// Where in the write path the failure happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The store rejected this individual row.
    Rejected,
    /// The whole batch failed after exhausting its retries.
    BatchExhausted,
    /// The batch hit an error that is never retried.
    BatchFatal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureError {
    pub error_type: String,
    pub message: String,
    pub is_retryable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureMetadata {
    pub run_id: Option<String>,
    pub batch_id: Option<String>,
    /// Row index within the batch.
    pub row_index: Option<usize>,
    pub attempts: Option<u32>,
}

impl FailedRow {
    pub fn new(
        table: impl Into<String>,
        write: &RowWrite,
        stage: FailureStage,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            table: table.into(),
            target: write.label(),
            stage,
            fields: write.fields.clone(),
            error: FailureError {
                error_type: error_type.into(),
                message: message.into(),
                is_retryable: false,
            },
            metadata: FailureMetadata::default(),
            failed_at: Utc::now(),
        }
    }

    pub fn with_execution_context(
        mut self,
        run_id: impl Into<String>,
        batch_id: impl Into<String>,
        row_index: usize,
    ) -> Self {
        self.metadata.run_id = Some(run_id.into());
        self.metadata.batch_id = Some(batch_id.into());
        self.metadata.row_index = Some(row_index);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.metadata.attempts = Some(attempts);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.error.is_retryable = retryable;
        self
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Rejected => write!(f, "Rejected"),
            FailureStage::BatchExhausted => write!(f, "BatchExhausted"),
            FailureStage::BatchFatal => write!(f, "BatchFatal"),
        }
    }
}
