//! Log leaves and signed log roots
//!
//! The append-only log anchors map roots: leaf `i` of the log holds the
//! canonical encoding of map revision `i`.

use serde::{Deserialize, Serialize};

use crate::ids::{Hash, LogId};

/// Domain separation tag for log root signatures.
const LOG_ROOT_TAG: &[u8] = b"kt/log-root/v1";

/// A leaf queued into the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLeaf {
    pub value: Vec<u8>,
    /// Content-derived identity; the log deduplicates on it.
    pub identity_hash: Hash,
}

/// A log head signed by the log backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLogRoot {
    pub log_id: LogId,
    pub tree_size: u64,
    pub root_hash: Hash,
    pub timestamp_nanos: i64,
    pub signature: Vec<u8>,
}

impl SignedLogRoot {
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LOG_ROOT_TAG.len() + 8 + 8 + 32 + 8);
        buf.extend_from_slice(LOG_ROOT_TAG);
        buf.extend_from_slice(&self.log_id.as_i64().to_be_bytes());
        buf.extend_from_slice(&self.tree_size.to_be_bytes());
        buf.extend_from_slice(&self.root_hash);
        buf.extend_from_slice(&self.timestamp_nanos.to_be_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_signing_bytes_bind_tree_size() {
        let a = SignedLogRoot {
            log_id: LogId::new(2),
            tree_size: 5,
            root_hash: [1u8; 32],
            timestamp_nanos: 10,
            signature: Vec::new(),
        };
        let mut b = a.clone();
        b.tree_size = 6;
        assert_ne!(a.signing_bytes(), b.signing_bytes());
    }
}
