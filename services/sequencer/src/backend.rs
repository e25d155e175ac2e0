//! Collaborator interfaces
//!
//! The log, the map, the mutation queue and the witness are external
//! services. The sequencer and monitor only see them through these traits;
//! `tools/simulation` provides in-memory implementations.

use std::sync::Arc;

use async_trait::async_trait;

use types::errors::BackendError;
use types::ids::{LogId, MapId, WitnessKey};
use types::log::{LogLeaf, SignedLogRoot};
use types::map::{MapLeaf, MapLeafInclusion, MapperMetadata, SignedMapRoot};
use types::mutation::{MapIndex, Mutation};

/// Append-only log of anchored map roots.
#[async_trait]
pub trait LogBackend: Send + Sync {
    async fn latest_root(&self, log_id: LogId) -> Result<SignedLogRoot, BackendError>;

    /// Queue a leaf for integration. Leaves with an identity hash already in
    /// the log are accepted and dropped.
    async fn queue_leaf(&self, log_id: LogId, leaf: LogLeaf) -> Result<(), BackendError>;
}

/// Verifiable map.
#[async_trait]
pub trait MapBackend: Send + Sync {
    async fn get_root(&self, map_id: MapId) -> Result<SignedMapRoot, BackendError>;

    /// Leaves and proofs for `indexes` at `revision` (`None` = latest).
    async fn get_leaves(
        &self,
        map_id: MapId,
        indexes: &[MapIndex],
        revision: Option<u64>,
    ) -> Result<Vec<MapLeafInclusion>, BackendError>;

    /// Write `leaves` as one new revision tagged with `metadata`.
    async fn set_leaves(
        &self,
        map_id: MapId,
        leaves: Vec<MapLeaf>,
        metadata: MapperMetadata,
    ) -> Result<SignedMapRoot, BackendError>;
}

/// Queue of pending mutations.
#[async_trait]
pub trait MutationQueue: Send + Sync {
    async fn begin_read(&self) -> Result<Box<dyn ReadTransaction>, BackendError>;
}

/// Read-only transaction over the mutation queue.
#[async_trait]
pub trait ReadTransaction: Send {
    /// All mutations with a sequence number above `sequence`, in order,
    /// plus the highest sequence number observed (`sequence` if none).
    async fn read_all_since(&mut self, sequence: u64)
        -> Result<(u64, Vec<Mutation>), BackendError>;

    async fn commit(self: Box<Self>) -> Result<(), BackendError>;

    async fn rollback(self: Box<Self>) -> Result<(), BackendError>;
}

/// Independent publisher of root hashes, consulted for cross-checks only.
#[async_trait]
pub trait Witness: Send + Sync {
    async fn get_root_hash(&self, key: &WitnessKey) -> Result<Option<Vec<u8>>, BackendError>;

    async fn put_root_hash(&self, key: &WitnessKey, hash: Vec<u8>) -> Result<(), BackendError>;
}

/// The three backends a sequencer writes through.
#[derive(Clone)]
pub struct Backends {
    pub log: Arc<dyn LogBackend>,
    pub map: Arc<dyn MapBackend>,
    pub queue: Arc<dyn MutationQueue>,
}
