use engine_config::settings::error::ConfigError;
use engine_runtime::error::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Sync pass failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Environment error: {0}")]
    Env(String),

    #[error("No {what} given; pass --{flag} or set {var}")]
    Missing {
        what: &'static str,
        flag: &'static str,
        var: &'static str,
    },
}

impl CliError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CliError::Sync(SyncError::Cancelled { .. }))
    }
}
