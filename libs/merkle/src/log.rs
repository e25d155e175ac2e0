//! RFC 6962 Merkle log: hashing, proof generation and verification
//!
//! Leaf hash: `SHA-256(0x00 || data)`; interior node: `SHA-256(0x01 || l || r)`;
//! the empty tree hashes to `SHA-256("")`. Verification follows the
//! RFC 9162 §2.1.3.2 / §2.1.4.2 algorithms; generation follows the
//! recursive `PATH` / `SUBPROOF` definitions. Generation is used by the
//! reference backends; the sequencer and monitor only verify.

use types::ids::Hash;

use crate::error::ProofError;
use crate::hash::{sha256, sha256_parts};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash of a log leaf.
pub fn leaf_hash(data: &[u8]) -> Hash {
    sha256_parts(&[&[LEAF_PREFIX], data])
}

/// Hash of an interior node.
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    sha256_parts(&[&[NODE_PREFIX], left, right])
}

/// Root of the empty log.
pub fn empty_root() -> Hash {
    sha256(b"")
}

/// Largest power of two strictly smaller than `n` (`n >= 2`).
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k << 1 < n {
        k <<= 1;
    }
    k
}

/// Merkle tree hash over already-hashed leaves.
pub fn root(leaves: &[Hash]) -> Hash {
    match leaves.len() {
        0 => empty_root(),
        1 => leaves[0],
        n => {
            let k = split_point(n);
            node_hash(&root(&leaves[..k]), &root(&leaves[k..]))
        }
    }
}

/// Audit path for leaf `index` in the tree formed by `leaves`.
pub fn inclusion_proof(leaves: &[Hash], index: usize) -> Option<Vec<Hash>> {
    if index >= leaves.len() {
        return None;
    }
    Some(path(index, leaves))
}

fn path(m: usize, leaves: &[Hash]) -> Vec<Hash> {
    let n = leaves.len();
    if n <= 1 {
        return Vec::new();
    }
    let k = split_point(n);
    if m < k {
        let mut p = path(m, &leaves[..k]);
        p.push(root(&leaves[k..]));
        p
    } else {
        let mut p = path(m - k, &leaves[k..]);
        p.push(root(&leaves[..k]));
        p
    }
}

/// Consistency proof from the first `old_size` leaves to all of `leaves`.
pub fn consistency_proof(leaves: &[Hash], old_size: usize) -> Option<Vec<Hash>> {
    if old_size > leaves.len() {
        return None;
    }
    if old_size == 0 || old_size == leaves.len() {
        return Some(Vec::new());
    }
    Some(subproof(old_size, leaves, true))
}

fn subproof(m: usize, leaves: &[Hash], complete: bool) -> Vec<Hash> {
    let n = leaves.len();
    if m == n {
        return if complete { Vec::new() } else { vec![root(leaves)] };
    }
    let k = split_point(n);
    if m <= k {
        let mut p = subproof(m, &leaves[..k], complete);
        p.push(root(&leaves[k..]));
        p
    } else {
        let mut p = subproof(m - k, &leaves[k..], false);
        p.push(root(&leaves[..k]));
        p
    }
}

/// Verify that `leaf` sits at `index` in a tree of `size` leaves with `root`.
pub fn verify_inclusion(
    index: u64,
    size: u64,
    leaf: &Hash,
    proof: &[Hash],
    root: &Hash,
) -> Result<(), ProofError> {
    if index >= size {
        return Err(ProofError::IndexOutOfRange { index, size });
    }

    let mut fnode = index;
    let mut snode = size - 1;
    let mut r = *leaf;

    for p in proof {
        if snode == 0 {
            return Err(ProofError::WrongProofLength);
        }
        if fnode & 1 == 1 || fnode == snode {
            r = node_hash(p, &r);
            while fnode & 1 == 0 && fnode != 0 {
                fnode >>= 1;
                snode >>= 1;
            }
        } else {
            r = node_hash(&r, p);
        }
        fnode >>= 1;
        snode >>= 1;
    }

    if snode != 0 {
        return Err(ProofError::WrongProofLength);
    }
    if r != *root {
        return Err(ProofError::RootMismatch);
    }
    Ok(())
}

/// Verify that the tree `(size2, root2)` is an append-only extension of
/// `(size1, root1)`.
pub fn verify_consistency(
    size1: u64,
    size2: u64,
    root1: &Hash,
    root2: &Hash,
    proof: &[Hash],
) -> Result<(), ProofError> {
    if size1 > size2 {
        return Err(ProofError::InvalidSizes {
            first: size1,
            second: size2,
        });
    }
    if size1 == size2 {
        if !proof.is_empty() {
            return Err(ProofError::WrongProofLength);
        }
        if root1 != root2 {
            return Err(ProofError::RootMismatch);
        }
        return Ok(());
    }
    // Every tree extends the empty tree.
    if size1 == 0 {
        if !proof.is_empty() {
            return Err(ProofError::WrongProofLength);
        }
        return Ok(());
    }
    if proof.is_empty() {
        return Err(ProofError::WrongProofLength);
    }

    let mut nodes: Vec<Hash> = Vec::with_capacity(proof.len() + 1);
    if size1.is_power_of_two() {
        nodes.push(*root1);
    }
    nodes.extend_from_slice(proof);

    let mut fnode = size1 - 1;
    let mut snode = size2 - 1;
    while fnode & 1 == 1 {
        fnode >>= 1;
        snode >>= 1;
    }

    let mut fr = nodes[0];
    let mut sr = nodes[0];
    for c in &nodes[1..] {
        if snode == 0 {
            return Err(ProofError::WrongProofLength);
        }
        if fnode & 1 == 1 || fnode == snode {
            fr = node_hash(c, &fr);
            sr = node_hash(c, &sr);
            while fnode & 1 == 0 && fnode != 0 {
                fnode >>= 1;
                snode >>= 1;
            }
        } else {
            sr = node_hash(&sr, c);
        }
        fnode >>= 1;
        snode >>= 1;
    }

    if snode != 0 {
        return Err(ProofError::WrongProofLength);
    }
    if fr != *root1 || sr != *root2 {
        return Err(ProofError::RootMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::to_hex;
    use proptest::prelude::*;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n).map(|i| leaf_hash(format!("leaf-{i}").as_bytes())).collect()
    }

    #[test]
    fn test_empty_root_is_hash_of_nothing() {
        assert_eq!(
            to_hex(&root(&[])),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let l = leaves(1);
        assert_eq!(root(&l), l[0]);
    }

    #[test]
    fn test_leaf_and_node_hashes_are_domain_separated() {
        let a = leaf_hash(b"x");
        let joined: Vec<u8> = a.iter().chain(a.iter()).copied().collect();
        assert_ne!(leaf_hash(&joined), node_hash(&a, &a));
    }

    #[test]
    fn test_inclusion_all_indexes_up_to_17() {
        for n in 1..=17 {
            let l = leaves(n);
            let r = root(&l);
            for i in 0..n {
                let proof = inclusion_proof(&l, i).unwrap();
                assert!(
                    verify_inclusion(i as u64, n as u64, &l[i], &proof, &r).is_ok(),
                    "n={n} i={i}"
                );
            }
        }
    }

    #[test]
    fn test_inclusion_rejects_wrong_leaf() {
        let l = leaves(7);
        let r = root(&l);
        let proof = inclusion_proof(&l, 3).unwrap();
        assert_eq!(
            verify_inclusion(3, 7, &l[4], &proof, &r),
            Err(ProofError::RootMismatch)
        );
    }

    #[test]
    fn test_inclusion_rejects_wrong_index() {
        let l = leaves(8);
        let r = root(&l);
        let proof = inclusion_proof(&l, 2).unwrap();
        assert!(verify_inclusion(3, 8, &l[2], &proof, &r).is_err());
        assert_eq!(
            verify_inclusion(8, 8, &l[2], &proof, &r),
            Err(ProofError::IndexOutOfRange { index: 8, size: 8 })
        );
    }

    #[test]
    fn test_inclusion_rejects_truncated_proof() {
        let l = leaves(9);
        let r = root(&l);
        let mut proof = inclusion_proof(&l, 5).unwrap();
        proof.pop();
        assert_eq!(
            verify_inclusion(5, 9, &l[5], &proof, &r),
            Err(ProofError::WrongProofLength)
        );
    }

    #[test]
    fn test_consistency_all_prefixes_up_to_17() {
        for n in 1..=17 {
            let l = leaves(n);
            let r2 = root(&l);
            for m in 0..=n {
                let r1 = root(&l[..m]);
                let proof = consistency_proof(&l, m).unwrap();
                assert!(
                    verify_consistency(m as u64, n as u64, &r1, &r2, &proof).is_ok(),
                    "m={m} n={n}"
                );
            }
        }
    }

    #[test]
    fn test_consistency_detects_rewritten_history() {
        let l = leaves(10);
        let mut forked = l.clone();
        forked[2] = leaf_hash(b"rewritten");
        let proof = consistency_proof(&forked, 6).unwrap();
        let result = verify_consistency(6, 10, &root(&l[..6]), &root(&forked), &proof);
        assert_eq!(result, Err(ProofError::RootMismatch));
    }

    #[test]
    fn test_consistency_rejects_shrinking_tree() {
        let l = leaves(4);
        let result = verify_consistency(4, 3, &root(&l), &root(&l[..3]), &[]);
        assert_eq!(result, Err(ProofError::InvalidSizes { first: 4, second: 3 }));
    }

    #[test]
    fn test_consistency_same_size_requires_same_root() {
        let l = leaves(5);
        let other = leaves(6);
        assert!(verify_consistency(5, 5, &root(&l), &root(&l), &[]).is_ok());
        assert_eq!(
            verify_consistency(5, 5, &root(&l), &root(&other[..5]), &[]),
            Ok(())
        );
        assert_eq!(
            verify_consistency(5, 5, &root(&l), &root(&other), &[]),
            Err(ProofError::RootMismatch)
        );
    }

    proptest! {
        #[test]
        fn prop_proofs_verify(n in 1usize..64, seed in any::<u64>()) {
            let l: Vec<Hash> = (0..n).map(|i| leaf_hash(&(seed ^ i as u64).to_le_bytes())).collect();
            let r = root(&l);
            let i = (seed as usize) % n;
            let m = (seed as usize / 7) % (n + 1);
            let incl = inclusion_proof(&l, i).unwrap();
            prop_assert!(verify_inclusion(i as u64, n as u64, &l[i], &incl, &r).is_ok());
            let cons = consistency_proof(&l, m).unwrap();
            prop_assert!(verify_consistency(m as u64, n as u64, &root(&l[..m]), &r, &cons).is_ok());
        }
    }
}
