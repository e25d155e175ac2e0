//! Root signing and verification
//!
//! Map and log backends sign their heads; the monitor countersigns map
//! roots it has verified. Every signature covers the fixed binary
//! `signing_bytes` of the root, which carry a per-role domain tag, so a
//! log signature can never be replayed as a map signature.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use types::log::SignedLogRoot;
use types::map::SignedMapRoot;
use types::monitoring::MonitorSignedRoot;

use crate::error::SigningError;

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

/// Ed25519 key used to sign roots.
#[derive(Clone)]
pub struct RootSigner {
    key: SigningKey,
}

impl RootSigner {
    /// Deterministic signer from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    /// Fill in the signature of a map root.
    pub fn sign_map_root(&self, mut root: SignedMapRoot) -> SignedMapRoot {
        root.signature = self.key.sign(&root.signing_bytes()).to_bytes().to_vec();
        root
    }

    /// Fill in the signature of a log root.
    pub fn sign_log_root(&self, mut root: SignedLogRoot) -> SignedLogRoot {
        root.signature = self.key.sign(&root.signing_bytes()).to_bytes().to_vec();
        root
    }

    /// Countersign a verified map root.
    pub fn countersign(&self, root: &SignedMapRoot) -> MonitorSignedRoot {
        let signature = self.key.sign(&MonitorSignedRoot::signing_bytes(root));
        MonitorSignedRoot {
            root: root.clone(),
            monitor_signature: signature.to_bytes().to_vec(),
        }
    }
}

impl std::fmt::Debug for RootSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootSigner")
            .field("verifying_key", &self.verifying_key_hex())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

fn verify_bytes(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<(), SigningError> {
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| SigningError::InvalidSignature)?;
    let signature = Signature::from_bytes(&sig_bytes);
    key.verify(message, &signature)
        .map_err(|_| SigningError::VerificationFailed)
}

pub fn verify_map_root(key: &VerifyingKey, root: &SignedMapRoot) -> Result<(), SigningError> {
    verify_bytes(key, &root.signing_bytes(), &root.signature)
}

pub fn verify_log_root(key: &VerifyingKey, root: &SignedLogRoot) -> Result<(), SigningError> {
    verify_bytes(key, &root.signing_bytes(), &root.signature)
}

pub fn verify_monitor_root(
    key: &VerifyingKey,
    signed: &MonitorSignedRoot,
) -> Result<(), SigningError> {
    verify_bytes(
        key,
        &MonitorSignedRoot::signing_bytes(&signed.root),
        &signed.monitor_signature,
    )
}

/// Parse a hex-encoded Ed25519 public key.
pub fn verifying_key_from_hex(encoded: &str) -> Result<VerifyingKey, SigningError> {
    let bytes = hex::decode(encoded).map_err(|_| SigningError::InvalidPublicKey)?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidPublicKey)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| SigningError::InvalidPublicKey)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{LogId, MapId};
    use types::map::MapperMetadata;

    fn test_signer() -> RootSigner {
        // Deterministic seed for repeatable test vectors
        let seed: [u8; 32] = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
            0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10,
            0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18,
            0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, 0x20,
        ];
        RootSigner::from_seed(seed)
    }

    fn map_root() -> SignedMapRoot {
        SignedMapRoot {
            map_id: MapId::new(1),
            revision: 3,
            root_hash: [9u8; 32],
            timestamp_nanos: 1_708_123_456_789_000_000,
            metadata: MapperMetadata { high_water_mark: 42 },
            signature: Vec::new(),
        }
    }

    fn log_root() -> SignedLogRoot {
        SignedLogRoot {
            log_id: LogId::new(2),
            tree_size: 4,
            root_hash: [5u8; 32],
            timestamp_nanos: 1_708_123_456_789_000_000,
            signature: Vec::new(),
        }
    }

    #[test]
    fn test_sign_and_verify_map_root() {
        let signer = test_signer();
        let root = signer.sign_map_root(map_root());
        assert_eq!(root.signature.len(), 64);
        assert!(verify_map_root(&signer.verifying_key(), &root).is_ok());
    }

    #[test]
    fn test_tampered_map_root_fails() {
        let signer = test_signer();
        let mut root = signer.sign_map_root(map_root());
        root.metadata.high_water_mark = 43;
        assert_eq!(
            verify_map_root(&signer.verifying_key(), &root),
            Err(SigningError::VerificationFailed)
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let root = test_signer().sign_map_root(map_root());
        let other = RootSigner::generate();
        assert_eq!(
            verify_map_root(&other.verifying_key(), &root),
            Err(SigningError::VerificationFailed)
        );
    }

    #[test]
    fn test_truncated_signature_is_invalid() {
        let signer = test_signer();
        let mut root = signer.sign_log_root(log_root());
        root.signature.truncate(10);
        assert_eq!(
            verify_log_root(&signer.verifying_key(), &root),
            Err(SigningError::InvalidSignature)
        );
    }

    #[test]
    fn test_log_root_round_trip() {
        let signer = test_signer();
        let root = signer.sign_log_root(log_root());
        assert!(verify_log_root(&signer.verifying_key(), &root).is_ok());
    }

    #[test]
    fn test_countersignature_binds_backend_signature() {
        let backend = test_signer();
        let monitor = RootSigner::from_seed([0x42; 32]);
        let root = backend.sign_map_root(map_root());

        let mut signed = monitor.countersign(&root);
        assert!(verify_monitor_root(&monitor.verifying_key(), &signed).is_ok());
        assert!(verify_monitor_root(&backend.verifying_key(), &signed).is_err());

        signed.root.signature[0] ^= 0xFF;
        assert_eq!(
            verify_monitor_root(&monitor.verifying_key(), &signed),
            Err(SigningError::VerificationFailed)
        );
    }

    #[test]
    fn test_verifying_key_from_hex() {
        let signer = test_signer();
        let parsed = verifying_key_from_hex(&signer.verifying_key_hex()).unwrap();
        assert_eq!(parsed, signer.verifying_key());
        assert_eq!(
            verifying_key_from_hex("not_hex"),
            Err(SigningError::InvalidPublicKey)
        );
        assert_eq!(
            verifying_key_from_hex("abcd"),
            Err(SigningError::InvalidPublicKey)
        );
    }
}
