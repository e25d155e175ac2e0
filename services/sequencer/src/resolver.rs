//! Conflict resolution for one epoch
//!
//! Every mutation in a batch is validated against the pre-epoch leaf at its
//! index, never against a value produced earlier in the same batch. When
//! several valid mutations target one index the last in sequence order
//! wins. Rejections are local: they are logged and reported, the batch
//! carries on.
//!
//! The function is pure. The verifier re-runs it on the published batch
//! and must arrive at the same leaves.

use std::collections::BTreeMap;

use tracing::warn;

use types::map::MapLeaf;
use types::mutation::{MapIndex, Mutation};

use crate::error::MutationError;
use crate::mutator::Mutator;

/// A mutation dropped from the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub sequence: u64,
    pub reason: MutationError,
}

/// Output of [`apply_mutations`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedBatch {
    /// New leaves, one per touched index, sorted by index.
    pub leaves: Vec<MapLeaf>,
    pub rejected: Vec<Rejection>,
}

impl ResolvedBatch {
    pub fn unique(&self) -> usize {
        self.leaves.len()
    }
}

/// Apply `mutations` (in queue order) to `current`, the pre-epoch leaves
/// for the touched indexes. Indexes absent from `current` are unset.
pub fn apply_mutations(
    mutator: &dyn Mutator,
    mutations: &[Mutation],
    current: &[MapLeaf],
) -> ResolvedBatch {
    let originals: BTreeMap<MapIndex, &[u8]> = current
        .iter()
        .map(|leaf| (leaf.index, leaf.value.as_slice()))
        .collect();

    // Raw key of the first accepted mutation per index; a different raw key
    // on the same index is a padding collision. Rejected mutations claim
    // nothing.
    let mut owners: BTreeMap<MapIndex, &[u8]> = BTreeMap::new();
    let mut resolved: BTreeMap<MapIndex, Vec<u8>> = BTreeMap::new();
    let mut rejected = Vec::new();

    for mutation in mutations {
        let outcome = resolve_one(mutator, mutation, &originals, &mut owners);
        match outcome {
            Ok((index, value)) => {
                resolved.insert(index, value);
            }
            Err(reason) => {
                warn!(
                    sequence = mutation.sequence,
                    error = %reason,
                    "Dropping rejected mutation"
                );
                rejected.push(Rejection {
                    sequence: mutation.sequence,
                    reason,
                });
            }
        }
    }

    ResolvedBatch {
        leaves: resolved
            .into_iter()
            .map(|(index, value)| MapLeaf { index, value })
            .collect(),
        rejected,
    }
}

fn resolve_one<'a>(
    mutator: &dyn Mutator,
    mutation: &'a Mutation,
    originals: &BTreeMap<MapIndex, &[u8]>,
    owners: &mut BTreeMap<MapIndex, &'a [u8]>,
) -> Result<(MapIndex, Vec<u8>), MutationError> {
    let index = mutation.index()?;

    if let Some(owner) = owners.get(&index) {
        if *owner != mutation.key.as_slice() {
            return Err(MutationError::KeyCollision { index });
        }
    }

    let old = originals.get(&index).copied();
    let value = mutator.mutate(old, mutation)?;
    owners.insert(index, mutation.key.as_slice());
    Ok((index, value))
}
