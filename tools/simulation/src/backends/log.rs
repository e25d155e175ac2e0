//! In-memory append-only log
//!
//! Leaves are integrated as soon as they are queued. A leaf whose identity
//! hash is already present is accepted and dropped.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use merkle::log::{consistency_proof, inclusion_proof, leaf_hash, root};
use merkle::signing::RootSigner;
use sequencer::backend::LogBackend;
use sequencer::timing::Clock;
use types::errors::BackendError;
use types::ids::{Hash, LogId};
use types::log::{LogLeaf, SignedLogRoot};

use super::FaultSwitch;

struct LogState {
    leaf_hashes: Vec<Hash>,
    values: Vec<Vec<u8>>,
    identities: BTreeSet<Hash>,
    head: SignedLogRoot,
}

/// A consistent view of the log at one tree size.
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    pub head: SignedLogRoot,
    pub leaf_hashes: Vec<Hash>,
}

impl LogSnapshot {
    pub fn inclusion(&self, index: u64) -> Option<Vec<Hash>> {
        inclusion_proof(&self.leaf_hashes, index as usize)
    }

    pub fn consistency(&self, from_size: u64) -> Option<Vec<Hash>> {
        consistency_proof(&self.leaf_hashes, from_size as usize)
    }
}

pub struct InMemoryLog {
    log_id: LogId,
    signer: RootSigner,
    clock: Arc<dyn Clock>,
    state: Mutex<LogState>,
    /// Fail the next `queue_leaf` calls.
    pub queue_faults: FaultSwitch,
}

impl InMemoryLog {
    pub fn new(log_id: LogId, signer: RootSigner, clock: Arc<dyn Clock>) -> Self {
        let head = sign_head(&signer, clock.as_ref(), log_id, &[]);
        Self {
            log_id,
            signer,
            clock,
            state: Mutex::new(LogState {
                leaf_hashes: Vec::new(),
                values: Vec::new(),
                identities: BTreeSet::new(),
                head,
            }),
            queue_faults: FaultSwitch::default(),
        }
    }

    pub fn verifying_key_hex(&self) -> String {
        self.signer.verifying_key_hex()
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_id(&self, log_id: LogId) -> Result<(), BackendError> {
        if log_id != self.log_id {
            return Err(BackendError::NotFound(format!("log {log_id}")));
        }
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.lock().leaf_hashes.len() as u64
    }

    /// Raw value of leaf `index`.
    pub fn leaf_value(&self, index: u64) -> Option<Vec<u8>> {
        self.lock().values.get(index as usize).cloned()
    }

    pub fn snapshot(&self) -> LogSnapshot {
        let state = self.lock();
        LogSnapshot {
            head: state.head.clone(),
            leaf_hashes: state.leaf_hashes.clone(),
        }
    }
}

fn sign_head(signer: &RootSigner, clock: &dyn Clock, log_id: LogId, leaves: &[Hash]) -> SignedLogRoot {
    signer.sign_log_root(SignedLogRoot {
        log_id,
        tree_size: leaves.len() as u64,
        root_hash: root(leaves),
        timestamp_nanos: clock.now().timestamp_nanos_opt().unwrap_or(0),
        signature: Vec::new(),
    })
}

#[async_trait]
impl LogBackend for InMemoryLog {
    async fn latest_root(&self, log_id: LogId) -> Result<SignedLogRoot, BackendError> {
        self.check_id(log_id)?;
        Ok(self.lock().head.clone())
    }

    async fn queue_leaf(&self, log_id: LogId, leaf: LogLeaf) -> Result<(), BackendError> {
        self.check_id(log_id)?;
        if self.queue_faults.trip() {
            return Err(BackendError::Unavailable("log queue unavailable".to_string()));
        }

        let mut state = self.lock();
        if !state.identities.insert(leaf.identity_hash) {
            debug!(log_id = %log_id, "Duplicate log leaf dropped");
            return Ok(());
        }
        state.leaf_hashes.push(leaf_hash(&leaf.value));
        state.values.push(leaf.value);
        state.head = sign_head(&self.signer, self.clock.as_ref(), log_id, &state.leaf_hashes);
        debug!(log_id = %log_id, tree_size = state.head.tree_size, "Log leaf integrated");
        Ok(())
    }
}
