//! Merkle: verifiable data structure primitives
//!
//! Provides the cryptographic building blocks shared by the sequencer, the
//! monitor and the reference backends:
//! - SHA-256 hashing helpers
//! - RFC 6962 log hashing with inclusion and consistency proofs
//! - A depth-256 sparse Merkle map with inclusion proofs and multi-leaf
//!   root recomputation
//! - Canonical encoding of map roots as log leaves (anchoring)
//! - Ed25519 signing and verification of map, log and monitor roots
//!
//! # Determinism
//! All functions are pure: no system time, no RNG (key generation aside),
//! no external calls. Maps use `BTreeMap` for sorted iteration.

pub mod anchor;
pub mod error;
pub mod hash;
pub mod log;
pub mod map;
pub mod signing;

pub use error::{ProofError, SigningError};

/// Crate version constant
pub const MERKLE_VERSION: &str = "1.0.0";
