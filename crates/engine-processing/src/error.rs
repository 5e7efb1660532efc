use connectors::error::StoreError;
use engine_core::retry::RetryError;
use model::execution::failed_row::FailureStage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Batch '{batch_id}' failed after {attempts} attempts: {source}")]
    Exhausted {
        batch_id: String,
        attempts: usize,
        #[source]
        source: StoreError,
    },

    #[error("Batch '{batch_id}' failed with a non-retryable error: {source}")]
    Fatal {
        batch_id: String,
        attempts: usize,
        #[source]
        source: StoreError,
    },
}

impl WriteError {
    pub fn from_retry(batch_id: impl Into<String>, err: RetryError<StoreError>) -> Self {
        let batch_id = batch_id.into();
        match err {
            RetryError::AttemptsExceeded { error, attempts } => WriteError::Exhausted {
                batch_id,
                attempts,
                source: error,
            },
            RetryError::Fatal { error, attempts } => WriteError::Fatal {
                batch_id,
                attempts,
                source: error,
            },
        }
    }

    pub fn batch_id(&self) -> &str {
        match self {
            WriteError::Exhausted { batch_id, .. } | WriteError::Fatal { batch_id, .. } => batch_id,
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            WriteError::Exhausted { attempts, .. } | WriteError::Fatal { attempts, .. } => *attempts,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, WriteError::Exhausted { .. })
    }

    pub fn stage(&self) -> FailureStage {
        match self {
            WriteError::Exhausted { .. } => FailureStage::BatchExhausted,
            WriteError::Fatal { .. } => FailureStage::BatchFatal,
        }
    }

    /// Short machine-readable name of the underlying store error.
    pub fn error_type(&self) -> &'static str {
        let source = match self {
            WriteError::Exhausted { source, .. } | WriteError::Fatal { source, .. } => source,
        };
        match source {
            StoreError::Io(_) => "io",
            StoreError::Json(_) => "json",
            StoreError::TableNotFound(_) => "table_not_found",
            StoreError::Transport(_) => "transport",
            StoreError::RateLimited(_) => "rate_limited",
            StoreError::Timeout(_) => "timeout",
            StoreError::Rejected(_) => "rejected",
            StoreError::Closed => "closed",
        }
    }
}
