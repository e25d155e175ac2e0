//! Monitor error types

use std::io;

use thiserror::Error;

use types::errors::BackendError;

/// Result Store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("result for epoch {epoch} already stored")]
    AlreadyStored { epoch: u64 },

    #[error("no result stored for epoch {epoch}")]
    NotFound { epoch: u64 },

    #[error("persistence failure: {0}")]
    Persistence(#[from] io::Error),

    #[error("encoding failure: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("journal corrupted at byte offset {offset}: {detail}")]
    Corruption { offset: u64, detail: String },
}

/// Failures of one `Monitor::process` call.
///
/// Verification failures are not errors here: they are stored in the
/// monitoring result.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("storing monitoring result failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("store task failed: {0}")]
    StoreTask(#[from] tokio::task::JoinError),

    #[error("fetching epoch {epoch} failed: {source}")]
    Source {
        epoch: u64,
        #[source]
        source: BackendError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::AlreadyStored { epoch: 7 };
        assert_eq!(err.to_string(), "result for epoch 7 already stored");
    }

    #[test]
    fn test_persistence_wraps_store_error() {
        let err: MonitorError = StoreError::NotFound { epoch: 3 }.into();
        assert!(matches!(
            err,
            MonitorError::Persistence(StoreError::NotFound { epoch: 3 })
        ));
    }
}
