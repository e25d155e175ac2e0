//! Anchoring map roots in the log
//!
//! Log leaf `i` carries the canonical JSON encoding of map revision `i`.
//! The leaf identity is the SHA-256 of that encoding, which lets the log
//! deduplicate a root queued twice.

use types::ids::Hash;
use types::log::LogLeaf;
use types::map::SignedMapRoot;

use crate::hash::sha256;
use crate::log::leaf_hash;

/// Canonical bytes stored in the log for `root`.
pub fn anchor_value(root: &SignedMapRoot) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(root)
}

/// Log leaf anchoring `root`.
pub fn anchor_leaf(root: &SignedMapRoot) -> Result<LogLeaf, serde_json::Error> {
    let value = anchor_value(root)?;
    let identity_hash = sha256(&value);
    Ok(LogLeaf {
        value,
        identity_hash,
    })
}

/// RFC 6962 leaf hash of the anchor for `root`, as proven by log inclusion.
pub fn anchored_leaf_hash(root: &SignedMapRoot) -> Result<Hash, serde_json::Error> {
    Ok(leaf_hash(&anchor_value(root)?))
}

/// Decode a log leaf value back into the map root it anchors.
pub fn decode_anchor(value: &[u8]) -> Result<SignedMapRoot, serde_json::Error> {
    serde_json::from_slice(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::MapId;
    use types::map::MapperMetadata;

    fn root(revision: u64) -> SignedMapRoot {
        SignedMapRoot {
            map_id: MapId::new(7),
            revision,
            root_hash: [revision as u8; 32],
            timestamp_nanos: 1_000 + revision as i64,
            metadata: MapperMetadata {
                high_water_mark: revision * 10,
            },
            signature: vec![0xAB; 64],
        }
    }

    #[test]
    fn test_anchor_decodes_back() {
        let leaf = anchor_leaf(&root(3)).unwrap();
        assert_eq!(decode_anchor(&leaf.value).unwrap(), root(3));
        assert_eq!(leaf.identity_hash, sha256(&leaf.value));
    }

    #[test]
    fn test_distinct_roots_have_distinct_identities() {
        let a = anchor_leaf(&root(1)).unwrap();
        let b = anchor_leaf(&root(2)).unwrap();
        assert_ne!(a.identity_hash, b.identity_hash);
    }

    #[test]
    fn test_anchored_leaf_hash_uses_log_leaf_prefix() {
        let r = root(4);
        let value = anchor_value(&r).unwrap();
        assert_eq!(anchored_leaf_hash(&r).unwrap(), leaf_hash(&value));
        assert_ne!(anchored_leaf_hash(&r).unwrap(), sha256(&value));
    }
}
