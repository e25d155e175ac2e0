//! Sparse Merkle map of depth 256
//!
//! Every [`MapIndex`] addresses one leaf. Unset leaves hash to zero and
//! empty subtrees collapse to precomputed hashes, so a tree holding a
//! handful of leaves is cheap to hash and prove.
//!
//! Leaf hash: `SHA-256(0x00 || index || value)`; interior node uses the
//! same `0x01` prefix as the log. Inclusion proofs carry 256 sibling
//! hashes ordered from the leaf level up to the root: `proof[level]` is
//! the sibling met when climbing past bit `255 - level` of the index.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use types::ids::Hash;
use types::map::{MapLeaf, MapLeafInclusion};
use types::mutation::{MapIndex, INDEX_BITS};

use crate::error::ProofError;
use crate::hash::sha256_parts;
use crate::log::node_hash;

const LEAF_PREFIX: u8 = 0x00;

/// Hash of a set map leaf.
pub fn map_leaf_hash(index: &MapIndex, value: &[u8]) -> Hash {
    sha256_parts(&[&[LEAF_PREFIX], index.as_bytes(), value])
}

fn empty_table() -> &'static [Hash] {
    static TABLE: OnceLock<Vec<Hash>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = vec![[0u8; 32]; INDEX_BITS + 1];
        for depth in (0..INDEX_BITS).rev() {
            table[depth] = node_hash(&table[depth + 1], &table[depth + 1]);
        }
        table
    })
}

/// Hash of an empty subtree rooted at `depth` (0 = map root, 256 = leaf).
pub fn empty_subtree(depth: usize) -> Hash {
    empty_table()[depth]
}

/// Root of the map with no leaves set.
pub fn empty_map_root() -> Hash {
    empty_subtree(0)
}

/// Fold a leaf hash up to the root along `proof`.
pub fn root_from_proof(index: &MapIndex, leaf: Hash, proof: &[Hash]) -> Result<Hash, ProofError> {
    if proof.len() != INDEX_BITS {
        return Err(ProofError::WrongProofLength);
    }
    let mut hash = leaf;
    for (level, sibling) in proof.iter().enumerate() {
        hash = if index.bit(INDEX_BITS - 1 - level) == 0 {
            node_hash(&hash, sibling)
        } else {
            node_hash(sibling, &hash)
        };
    }
    Ok(hash)
}

/// Verify `value` (or absence, for `None`) at `index` against `root`.
pub fn verify_map_inclusion(
    root: &Hash,
    index: &MapIndex,
    value: Option<&[u8]>,
    proof: &[Hash],
) -> Result<(), ProofError> {
    let leaf = match value {
        Some(v) => map_leaf_hash(index, v),
        None => empty_subtree(INDEX_BITS),
    };
    if root_from_proof(index, leaf, proof)? != *root {
        return Err(ProofError::RootMismatch);
    }
    Ok(())
}

/// Hash of the subtree at `depth` holding `leaves`, which must be sorted
/// by index and share their first `depth` bits.
fn subtree_root(depth: usize, leaves: &[(MapIndex, Hash)]) -> Hash {
    if leaves.is_empty() {
        return empty_subtree(depth);
    }
    if depth == INDEX_BITS {
        return leaves[0].1;
    }
    let split = leaves.partition_point(|(index, _)| index.bit(depth) == 0);
    let left = subtree_root(depth + 1, &leaves[..split]);
    let right = subtree_root(depth + 1, &leaves[split..]);
    node_hash(&left, &right)
}

/// In-memory sparse Merkle map.
///
/// Used by the reference map backend and by tests; the sequencer itself
/// never holds the map.
#[derive(Debug, Clone, Default)]
pub struct SparseMerkleTree {
    leaves: BTreeMap<MapIndex, Vec<u8>>,
}

impl SparseMerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn get(&self, index: &MapIndex) -> Option<&[u8]> {
        self.leaves.get(index).map(Vec::as_slice)
    }

    /// Set one leaf, returning the previous value.
    pub fn set(&mut self, index: MapIndex, value: Vec<u8>) -> Option<Vec<u8>> {
        self.leaves.insert(index, value)
    }

    pub fn apply(&mut self, leaves: impl IntoIterator<Item = MapLeaf>) {
        for leaf in leaves {
            self.leaves.insert(leaf.index, leaf.value);
        }
    }

    fn hashed(&self) -> Vec<(MapIndex, Hash)> {
        self.leaves
            .iter()
            .map(|(index, value)| (*index, map_leaf_hash(index, value)))
            .collect()
    }

    pub fn root(&self) -> Hash {
        subtree_root(0, &self.hashed())
    }

    /// Sibling path for `index`, leaf level first.
    pub fn prove(&self, index: &MapIndex) -> Vec<Hash> {
        let hashed = self.hashed();
        let mut slice: &[(MapIndex, Hash)] = &hashed;
        let mut siblings = Vec::with_capacity(INDEX_BITS);
        for depth in 0..INDEX_BITS {
            let split = slice.partition_point(|(i, _)| i.bit(depth) == 0);
            let (left, right) = slice.split_at(split);
            if index.bit(depth) == 0 {
                siblings.push(subtree_root(depth + 1, right));
                slice = left;
            } else {
                siblings.push(subtree_root(depth + 1, left));
                slice = right;
            }
        }
        siblings.reverse();
        siblings
    }

    /// Value and proof for `index`, in the shape the map backend returns.
    pub fn inclusion(&self, index: &MapIndex) -> MapLeafInclusion {
        MapLeafInclusion {
            index: *index,
            value: self.leaves.get(index).cloned(),
            inclusion: self.prove(index),
        }
    }
}

/// A new leaf value together with the pre-update proof for its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafUpdate<'a> {
    pub index: MapIndex,
    pub value: &'a [u8],
    /// Siblings of `index` in the tree before any update is applied.
    pub proof: &'a [Hash],
}

/// Root after applying `updates` to the tree the proofs were taken from.
///
/// Updated nodes are merged level by level; wherever a sibling is itself
/// updated its new hash replaces the proof entry. Proofs must all come
/// from the same pre-update root for the result to be meaningful.
pub fn root_from_updates(updates: &[LeafUpdate<'_>]) -> Result<Hash, ProofError> {
    if updates.is_empty() {
        return Err(ProofError::NoUpdates);
    }

    // prefix -> (hash, owning update)
    let mut level: BTreeMap<MapIndex, (Hash, usize)> = BTreeMap::new();
    for (owner, update) in updates.iter().enumerate() {
        if update.proof.len() != INDEX_BITS {
            return Err(ProofError::WrongProofLength);
        }
        let hash = map_leaf_hash(&update.index, update.value);
        if level.insert(update.index, (hash, owner)).is_some() {
            return Err(ProofError::DuplicateIndex);
        }
    }

    for step in 0..INDEX_BITS {
        let bit_pos = INDEX_BITS - step - 1;
        let mut parents: BTreeMap<MapIndex, (Hash, usize)> = BTreeMap::new();
        for (prefix, (hash, owner)) in &level {
            let parent = prefix.with_bit(bit_pos, 0);
            if parents.contains_key(&parent) {
                continue;
            }
            let bit = prefix.bit(bit_pos);
            let sibling_prefix = prefix.with_bit(bit_pos, 1 - bit);
            let sibling = match level.get(&sibling_prefix) {
                Some((h, _)) => *h,
                None => updates[*owner].proof[step],
            };
            let combined = if bit == 0 {
                node_hash(hash, &sibling)
            } else {
                node_hash(&sibling, hash)
            };
            parents.insert(parent, (combined, *owner));
        }
        level = parents;
    }

    level
        .get(&MapIndex::ZERO)
        .map(|(hash, _)| *hash)
        .ok_or(ProofError::RootMismatch)
}
