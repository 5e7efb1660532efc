use connectors::error::StoreError;
use engine_core::retry::RetryDisposition;

/// Transport-level trouble is worth another attempt; a store that understood
/// the request and refused it is not.
pub fn classify_store_error(err: &StoreError) -> RetryDisposition {
    match err {
        StoreError::Io(_)
        | StoreError::Transport(_)
        | StoreError::RateLimited(_)
        | StoreError::Timeout(_)
        | StoreError::Closed => RetryDisposition::Retry,
        StoreError::Json(_) => RetryDisposition::Stop,
        StoreError::TableNotFound(_) => RetryDisposition::Stop,
        StoreError::Rejected(_) => RetryDisposition::Stop,
    }
}
