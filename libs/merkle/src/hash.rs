//! SHA-256 helpers

use sha2::{Digest, Sha256};
use types::ids::Hash;

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of `parts`.
pub fn sha256_parts(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Hex rendering of a hash.
pub fn to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}
