//! Identifier types for the trees the sequencer drives
//!
//! Map and log trees are addressed by signed 64-bit tree ids assigned by the
//! backend that hosts them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A SHA-256 digest.
pub type Hash = [u8; 32];

/// Identifier of a verifiable map tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(i64);

impl MapId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an append-only log tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(i64);

impl LogId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key under which a root hash is published to an external witness.
///
/// Rendered as `"<map id>|<revision>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WitnessKey {
    pub map_id: MapId,
    pub revision: u64,
}

impl WitnessKey {
    pub fn new(map_id: MapId, revision: u64) -> Self {
        Self { map_id, revision }
    }
}

impl fmt::Display for WitnessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.map_id, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_ids_display() {
        assert_eq!(MapId::new(42).to_string(), "42");
        assert_eq!(LogId::new(-7).to_string(), "-7");
    }

    #[test]
    fn test_witness_key_format() {
        let key = WitnessKey::new(MapId::new(3), 17);
        assert_eq!(key.to_string(), "3|17");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&MapId::new(9)).unwrap();
        assert_eq!(json, "9");
    }
}
