//! Queued mutations and canonical map indexes
//!
//! A mutation is an opaque, signed key/value update read from the mutation
//! queue. The queue assigns every mutation a strictly increasing sequence
//! number; mutations are immutable once read.
//!
//! Map leaves are addressed by a fixed 32-byte [`MapIndex`]. Keys shorter
//! than the canonical width are zero-padded, so `b"ab"` and `b"ab\0"` land
//! on the same index; keys longer than the width are rejected rather than
//! truncated.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::IndexError;

/// Width of a canonical map index in bytes.
pub const INDEX_LEN: usize = 32;

/// Number of bits in a map index (depth of the sparse map).
pub const INDEX_BITS: usize = INDEX_LEN * 8;

/// Fixed-width map index.
///
/// Ordering is lexicographic over the bytes, which matches the MSB-first
/// bit order used to walk the sparse map.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapIndex([u8; INDEX_LEN]);

impl MapIndex {
    pub const ZERO: MapIndex = MapIndex([0u8; INDEX_LEN]);

    pub const fn from_bytes(bytes: [u8; INDEX_LEN]) -> Self {
        Self(bytes)
    }

    /// Canonicalize a raw key: zero-pad short keys, reject over-long ones.
    pub fn from_key(key: &[u8]) -> Result<Self, IndexError> {
        if key.len() > INDEX_LEN {
            return Err(IndexError::KeyTooLong {
                len: key.len(),
                max: INDEX_LEN,
            });
        }
        let mut index = [0u8; INDEX_LEN];
        index[..key.len()].copy_from_slice(key);
        Ok(Self(index))
    }

    pub fn as_bytes(&self) -> &[u8; INDEX_LEN] {
        &self.0
    }

    /// Bit at `depth`, counting from the most significant bit of byte 0.
    pub fn bit(&self, depth: usize) -> u8 {
        (self.0[depth / 8] >> (7 - depth % 8)) & 1
    }

    /// Copy of this index with the bit at `depth` set to `value`.
    pub fn with_bit(&self, depth: usize, value: u8) -> Self {
        let mut out = self.0;
        let mask = 1u8 << (7 - depth % 8);
        if value == 0 {
            out[depth / 8] &= !mask;
        } else {
            out[depth / 8] |= mask;
        }
        Self(out)
    }

    /// Keep the first `depth` bits and clear the rest.
    pub fn prefix(&self, depth: usize) -> Self {
        let mut out = [0u8; INDEX_LEN];
        let full = depth / 8;
        out[..full].copy_from_slice(&self.0[..full]);
        let rem = depth % 8;
        if rem > 0 {
            out[full] = self.0[full] & (0xFFu8 << (8 - rem));
        }
        Self(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for MapIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapIndex({})", self.to_hex())
    }
}

impl fmt::Display for MapIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A signed key/value update waiting in the mutation queue.
///
/// `payload` is opaque here; its meaning belongs to the mutation-application
/// policy that turns `(old leaf value, mutation)` into a new leaf value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    /// Sequence number assigned by the mutation queue.
    pub sequence: u64,
    /// Raw key the mutation targets.
    pub key: Vec<u8>,
    /// Opaque signed update.
    pub payload: Vec<u8>,
}

impl Mutation {
    pub fn new(sequence: u64, key: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sequence,
            key: key.into(),
            payload: payload.into(),
        }
    }

    /// Canonical map index of this mutation's key.
    pub fn index(&self) -> Result<MapIndex, IndexError> {
        MapIndex::from_key(&self.key)
    }
}
