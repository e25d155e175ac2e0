//! Proof and signature error types

use thiserror::Error;

/// Failure to verify or build a Merkle proof.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("leaf index {index} out of range for tree size {size}")]
    IndexOutOfRange { index: u64, size: u64 },

    #[error("invalid tree sizes: {first} > {second}")]
    InvalidSizes { first: u64, second: u64 },

    #[error("proof has the wrong number of nodes")]
    WrongProofLength,

    #[error("recomputed root does not match")]
    RootMismatch,

    #[error("duplicate leaf index in update set")]
    DuplicateIndex,

    #[error("empty update set")]
    NoUpdates,
}

/// Failure to verify a signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signature verification failed")]
    VerificationFailed,
}
