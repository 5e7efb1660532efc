use connectors::error::StoreError;
use engine_config::settings::error::ConfigError;
use thiserror::Error;

/// Errors that abort a sync pass. Write failures are not among them: they
/// are reported in the summary and the pass still completes.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A snapshot could not be read; nothing has been written for the stage.
    #[error("Failed to fetch table '{table}': {source}")]
    Fetch {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Sync pass cancelled before stage '{stage}' was written")]
    Cancelled { stage: String },

    /// A background task panicked or was aborted.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
