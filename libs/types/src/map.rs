//! Map leaves and signed map roots
//!
//! The verifiable map is an external backend; these types describe what it
//! returns. Every revision of the map carries mapper metadata recording the
//! high-water mark: the highest mutation sequence number fully incorporated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{Hash, MapId};
use crate::mutation::MapIndex;

/// Domain separation tag for map root signatures.
const MAP_ROOT_TAG: &[u8] = b"kt/map-root/v1";

/// A leaf to write into the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLeaf {
    pub index: MapIndex,
    pub value: Vec<u8>,
}

impl MapLeaf {
    pub fn new(index: MapIndex, value: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            value: value.into(),
        }
    }
}

/// A leaf read back from the map together with its inclusion proof.
///
/// `value` is `None` when the index has never been set; the proof is then
/// a proof of absence against the same root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLeafInclusion {
    pub index: MapIndex,
    pub value: Option<Vec<u8>>,
    /// Sibling hashes ordered from the leaf level up to the root.
    pub inclusion: Vec<Hash>,
}

impl MapLeafInclusion {
    /// The leaf, if the index is set.
    pub fn leaf(&self) -> Option<MapLeaf> {
        self.value.as_ref().map(|v| MapLeaf::new(self.index, v.clone()))
    }
}

/// Per-revision metadata written alongside new leaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperMetadata {
    /// Highest mutation sequence number fully incorporated.
    pub high_water_mark: u64,
}

/// A map head signed by the map backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMapRoot {
    pub map_id: MapId,
    pub revision: u64,
    pub root_hash: Hash,
    /// Unix nanoseconds at which the backend produced this revision.
    pub timestamp_nanos: i64,
    pub metadata: MapperMetadata,
    /// Backend signature over [`SignedMapRoot::signing_bytes`].
    pub signature: Vec<u8>,
}

impl SignedMapRoot {
    pub fn high_water_mark(&self) -> u64 {
        self.metadata.high_water_mark
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_nanos)
    }

    /// Fixed binary encoding of every field except the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAP_ROOT_TAG.len() + 8 + 8 + 32 + 8 + 8);
        buf.extend_from_slice(MAP_ROOT_TAG);
        buf.extend_from_slice(&self.map_id.as_i64().to_be_bytes());
        buf.extend_from_slice(&self.revision.to_be_bytes());
        buf.extend_from_slice(&self.root_hash);
        buf.extend_from_slice(&self.timestamp_nanos.to_be_bytes());
        buf.extend_from_slice(&self.metadata.high_water_mark.to_be_bytes());
        buf
    }

    pub fn root_hash_hex(&self) -> String {
        hex::encode(self.root_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_root() -> SignedMapRoot {
        SignedMapRoot {
            map_id: MapId::new(1),
            revision: 4,
            root_hash: [7u8; 32],
            timestamp_nanos: 1_708_123_456_789_000_000,
            metadata: MapperMetadata { high_water_mark: 12 },
            signature: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_signing_bytes_exclude_signature() {
        let a = sample_root();
        let mut b = sample_root();
        b.signature = vec![9, 9];
        assert_eq!(a.signing_bytes(), b.signing_bytes());
    }

    #[test]
    fn test_signing_bytes_cover_high_water_mark() {
        let a = sample_root();
        let mut b = sample_root();
        b.metadata.high_water_mark = 13;
        assert_ne!(a.signing_bytes(), b.signing_bytes());
    }

    #[test]
    fn test_timestamp_conversion() {
        let root = sample_root();
        assert_eq!(root.timestamp().timestamp_nanos_opt(), Some(root.timestamp_nanos));
    }

    #[test]
    fn test_absent_leaf_has_no_map_leaf() {
        let incl = MapLeafInclusion {
            index: MapIndex::ZERO,
            value: None,
            inclusion: Vec::new(),
        };
        assert!(incl.leaf().is_none());
    }
}
