//! Monitor configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use serde::Deserialize;

use merkle::error::SigningError;
use merkle::signing::verifying_key_from_hex;
use types::ids::MapId;

use crate::error::StoreError;
use crate::storage::{FileResultStore, MemoryResultStore, ResultStore};

/// Where monitoring results are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    File {
        path: PathBuf,
    },
}

impl StoreConfig {
    pub fn open(&self) -> Result<Arc<dyn ResultStore>, StoreError> {
        Ok(match self {
            StoreConfig::Memory => Arc::new(MemoryResultStore::new()),
            StoreConfig::File { path } => Arc::new(FileResultStore::open(path)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub map_id: MapId,
    /// Hex Ed25519 key of the log backend.
    pub log_public_key: Option<String>,
    /// Hex Ed25519 key of the map backend.
    pub map_public_key: Option<String>,
    /// Deadline for each witness cross-check.
    pub witness_timeout_ms: u64,
    pub store: StoreConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            map_id: MapId::new(1),
            log_public_key: None,
            map_public_key: None,
            witness_timeout_ms: 2_000,
            store: StoreConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn witness_timeout(&self) -> Duration {
        Duration::from_millis(self.witness_timeout_ms)
    }

    /// Parse the configured backend keys as `(log, map)`.
    pub fn verifying_keys(&self) -> Result<(VerifyingKey, VerifyingKey), SigningError> {
        let log = self
            .log_public_key
            .as_deref()
            .ok_or(SigningError::InvalidPublicKey)?;
        let map = self
            .map_public_key
            .as_deref()
            .ok_or(SigningError::InvalidPublicKey)?;
        Ok((verifying_key_from_hex(log)?, verifying_key_from_hex(map)?))
    }
}
