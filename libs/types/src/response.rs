//! Mutation-batch responses
//!
//! A [`MutationsResponse`] is what the key server hands an external client
//! that asks "what changed in epoch N?". It embeds every proof a verifier
//! needs, so verification never has to call back into a backend.

use serde::{Deserialize, Serialize};

use crate::ids::Hash;
use crate::log::SignedLogRoot;
use crate::map::{MapLeafInclusion, SignedMapRoot};
use crate::mutation::Mutation;

/// One mutation of the epoch plus the pre-epoch leaf it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationProof {
    pub mutation: Mutation,
    /// Leaf at the mutation's index in the previous revision, proven
    /// against the previous map root.
    pub leaf_proof: MapLeafInclusion,
}

/// Everything a client needs to verify one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationsResponse {
    pub epoch: u64,
    /// Map root of `epoch`.
    pub map_root: SignedMapRoot,
    /// Map root of `epoch - 1`; absent only for the genesis epoch.
    pub previous_map_root: Option<SignedMapRoot>,
    /// Latest log root known to the server.
    pub log_root: SignedLogRoot,
    /// Tree size the consistency proof starts from.
    pub log_consistency_from: u64,
    /// Consistency proof from `log_consistency_from` to `log_root.tree_size`.
    pub log_consistency: Vec<Hash>,
    /// Inclusion of `map_root` at log index `epoch`.
    pub log_inclusion: Vec<Hash>,
    /// Inclusion of `previous_map_root` at log index `epoch - 1`.
    pub previous_log_inclusion: Vec<Hash>,
    /// Mutations incorporated in this epoch, in sequence order.
    pub mutations: Vec<MutationProof>,
}

impl MutationsResponse {
    pub fn previous_high_water_mark(&self) -> u64 {
        self.previous_map_root
            .as_ref()
            .map(|r| r.high_water_mark())
            .unwrap_or(0)
    }
}
