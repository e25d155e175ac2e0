//! Error types for the epoch sequencer
//!
//! [`SequencerError`] aborts one epoch-creation cycle; the timing loop logs
//! it and retries on the next tick. [`MutationError`] rejects a single
//! mutation and never leaves the conflict resolver.

use thiserror::Error;
use types::errors::{BackendError, IndexError};
use types::mutation::MapIndex;

/// Failure of one epoch-creation cycle.
#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("{rpc}({id}) failed: {source}")]
    BackendUnavailable {
        rpc: &'static str,
        id: String,
        #[source]
        source: BackendError,
    },

    #[error("{rpc} exceeded the cycle deadline")]
    DeadlineExceeded { rpc: &'static str },

    /// The map revision exists but was not anchored in the log.
    #[error("map revision {revision} written but not anchored in the log: {source}")]
    AnchorFailure {
        revision: u64,
        #[source]
        source: BackendError,
    },

    #[error("failed to encode map root for anchoring: {0}")]
    AnchorEncoding(#[from] serde_json::Error),

    #[error("map root signature for revision {revision} does not verify")]
    UntrustedMapRoot { revision: u64 },

    #[error("leaf proof for index {index} does not verify")]
    UntrustedLeaf { index: MapIndex },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SequencerError {
    pub(crate) fn backend(rpc: &'static str, id: impl ToString, source: BackendError) -> Self {
        match source {
            BackendError::DeadlineExceeded => SequencerError::DeadlineExceeded { rpc },
            source => SequencerError::BackendUnavailable {
                rpc,
                id: id.to_string(),
                source,
            },
        }
    }
}

/// Reason a single mutation was dropped from its batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("invalid key: {0}")]
    InvalidKey(#[from] IndexError),

    #[error("key collides with a different key on index {index}")]
    KeyCollision { index: MapIndex },

    #[error("malformed mutation payload: {0}")]
    MalformedPayload(String),

    #[error("stored leaf value cannot be decoded: {0}")]
    MalformedLeaf(String),

    #[error("previous entry hash does not match the current leaf")]
    StalePrevious,

    #[error("version {got} does not follow current version (expected {expected})")]
    VersionMismatch { expected: u64, got: u64 },

    #[error("entry data of {len} bytes exceeds limit {max}")]
    Oversize { len: usize, max: usize },
}
