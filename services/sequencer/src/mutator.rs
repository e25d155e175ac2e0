//! Mutation-application policy
//!
//! A [`Mutator`] turns `(current leaf value, mutation)` into the next leaf
//! value or rejects the mutation. The conflict resolver and the verifier
//! both call the same policy, so the two always agree on the state
//! transition.
//!
//! [`EntryMutator`] is the versioned-entry policy: each leaf holds an
//! [`Entry`] that chains to its predecessor by hash, and a mutation must
//! name the exact entry it replaces. Key-owner authorization is not checked
//! here.

use serde::{Deserialize, Serialize};

use merkle::hash::sha256;
use types::ids::Hash;
use types::mutation::Mutation;

use crate::error::MutationError;

/// Default upper bound on entry data.
pub const DEFAULT_MAX_DATA_LEN: usize = 4096;

pub trait Mutator: Send + Sync {
    fn mutate(&self, old: Option<&[u8]>, mutation: &Mutation) -> Result<Vec<u8>, MutationError>;
}

/// Leaf value stored by [`EntryMutator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// 0 for the first entry at a key, then +1 per update.
    pub version: u64,
    pub data: Vec<u8>,
    /// Hash of the encoded entry this one replaced, zero for the first.
    pub previous: Hash,
}

impl Entry {
    pub fn encode(&self) -> Result<Vec<u8>, MutationError> {
        bincode::serialize(self).map_err(|e| MutationError::MalformedLeaf(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MutationError> {
        bincode::deserialize(bytes).map_err(|e| MutationError::MalformedLeaf(e.to_string()))
    }
}

/// Mutation payload understood by [`EntryMutator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub version: u64,
    pub data: Vec<u8>,
    /// Hash of the leaf value being replaced, zero when the key is unset.
    pub previous: Hash,
}

impl EntryUpdate {
    /// Update that replaces `current` (the raw leaf value, if any).
    pub fn chained(current: Option<&[u8]>, data: impl Into<Vec<u8>>) -> Result<Self, MutationError> {
        let (version, previous) = match current {
            Some(bytes) => (Entry::decode(bytes)?.version + 1, sha256(bytes)),
            None => (0, [0u8; 32]),
        };
        Ok(Self {
            version,
            data: data.into(),
            previous,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, MutationError> {
        bincode::serialize(self).map_err(|e| MutationError::MalformedPayload(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MutationError> {
        bincode::deserialize(bytes).map_err(|e| MutationError::MalformedPayload(e.to_string()))
    }
}

/// Versioned, hash-chained entry policy.
#[derive(Debug, Clone)]
pub struct EntryMutator {
    max_data_len: usize,
}

impl EntryMutator {
    pub fn new() -> Self {
        Self {
            max_data_len: DEFAULT_MAX_DATA_LEN,
        }
    }

    pub fn with_max_data_len(max_data_len: usize) -> Self {
        Self { max_data_len }
    }
}

impl Default for EntryMutator {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutator for EntryMutator {
    fn mutate(&self, old: Option<&[u8]>, mutation: &Mutation) -> Result<Vec<u8>, MutationError> {
        let update = EntryUpdate::decode(&mutation.payload)?;

        if update.data.len() > self.max_data_len {
            return Err(MutationError::Oversize {
                len: update.data.len(),
                max: self.max_data_len,
            });
        }

        let (expected_version, expected_previous) = match old {
            Some(bytes) => (Entry::decode(bytes)?.version + 1, sha256(bytes)),
            None => (0, [0u8; 32]),
        };

        if update.previous != expected_previous {
            return Err(MutationError::StalePrevious);
        }
        if update.version != expected_version {
            return Err(MutationError::VersionMismatch {
                expected: expected_version,
                got: update.version,
            });
        }

        Entry {
            version: update.version,
            data: update.data,
            previous: update.previous,
        }
        .encode()
    }
}
