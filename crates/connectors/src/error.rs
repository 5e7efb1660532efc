use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Local I/O failure (file-backed stores).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A table snapshot or response body could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Network or protocol failure talking to the store.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store asked the caller to slow down.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The store refused the request as a whole (bad payload, permissions).
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Store is closed")]
    Closed,
}
