//! Monitoring results and verification failures
//!
//! Exactly one [`MonitoringResult`] exists per epoch. It records when the
//! monitor saw the epoch, the monitor-signed map root on success, and the
//! ordered verification failures otherwise. The original response is kept
//! only for failed epochs so it can be inspected later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::map::SignedMapRoot;
use crate::response::MutationsResponse;

/// Domain separation tag for monitor signatures.
const MONITOR_TAG: &[u8] = b"kt/monitor-root/v1";

/// A verified map root countersigned by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSignedRoot {
    pub root: SignedMapRoot,
    /// Monitor signature over [`MonitorSignedRoot::signing_bytes`].
    pub monitor_signature: Vec<u8>,
}

impl MonitorSignedRoot {
    /// Bytes the monitor signs: the root's own signing bytes plus the
    /// backend signature, under a monitor-specific tag.
    pub fn signing_bytes(root: &SignedMapRoot) -> Vec<u8> {
        let inner = root.signing_bytes();
        let mut buf = Vec::with_capacity(MONITOR_TAG.len() + inner.len() + root.signature.len());
        buf.extend_from_slice(MONITOR_TAG);
        buf.extend_from_slice(&inner);
        buf.extend_from_slice(&root.signature);
        buf
    }
}

/// One failed verification step.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationError {
    #[error("log root signature invalid (tree size {tree_size})")]
    LogRootSignature { tree_size: u64 },

    #[error("log consistency proof from size {from_size} to {to_size} failed")]
    LogConsistency { from_size: u64, to_size: u64 },

    #[error("map root signature invalid (revision {revision})")]
    MapRootSignature { revision: u64 },

    #[error("response epoch {epoch} does not match map revision {revision}")]
    EpochMismatch { epoch: u64, revision: u64 },

    #[error("map root for revision {revision} not included in log of size {tree_size}")]
    MapRootInclusion { revision: u64, tree_size: u64 },

    #[error("previous map root missing for epoch {epoch}")]
    MissingPreviousRoot { epoch: u64 },

    #[error("previous map root for revision {revision} differs from the trusted root")]
    PreviousRootMismatch { revision: u64 },

    #[error("high-water mark regressed from {previous} to {current}")]
    HighWaterMarkRegression { previous: u64, current: u64 },

    #[error("malformed mutation {sequence}: {reason}")]
    MalformedMutation { sequence: u64, reason: String },

    #[error("mutation {sequence} key does not match proven leaf index")]
    IndexMismatch { sequence: u64 },

    #[error("leaf proof for mutation {sequence} does not verify against the previous root")]
    LeafInclusion { sequence: u64 },

    #[error("mutation {sequence} outside sequence window ({low}, {high}]")]
    SequenceOutOfRange { sequence: u64, low: u64, high: u64 },

    #[error("mutation {sequence} out of order after {previous}")]
    SequenceOrder { sequence: u64, previous: u64 },

    #[error("recomputed map root differs from published root at revision {revision}")]
    RootMismatch { revision: u64 },
}

/// Durable record of one verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringResult {
    pub epoch: u64,
    /// Unix nanoseconds at which the response was received.
    pub seen_nanos: i64,
    /// Monitor-signed root when every verification step passed.
    pub signed_root: Option<MonitorSignedRoot>,
    /// Failed verification steps, in the order they were detected.
    pub errors: Vec<VerificationError>,
    /// The original response, kept for failed epochs.
    pub response: Option<MutationsResponse>,
}

impl MonitoringResult {
    pub fn is_verified(&self) -> bool {
        self.errors.is_empty() && self.signed_root.is_some()
    }

    pub fn seen_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.seen_nanos)
    }
}
