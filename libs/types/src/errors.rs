//! Error types shared across crates
//!
//! Collaborator RPC failures and key canonicalization failures.

use thiserror::Error;

/// Failure of an RPC to an external collaborator (log, map, queue, witness).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Failure to canonicalize a raw key into a map index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("key length {len} exceeds index width {max}")]
    KeyTooLong { len: usize, max: usize },
}
