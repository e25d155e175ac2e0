//! Key server read path
//!
//! Builds the mutation-batch response for an epoch from the reference
//! backends: the map revision and its predecessor, log proofs against the
//! current log head, and every mutation in the epoch's sequence window with
//! its pre-epoch leaf proof.
//!
//! Mutations whose key cannot be canonicalized never reach the map and are
//! left out of responses.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use monitor::EpochSource;
use types::errors::BackendError;
use types::response::{MutationProof, MutationsResponse};

use crate::backends::{InMemoryLog, InMemoryMap, InMemoryQueue};

/// How a dishonest server distorts a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tamper {
    /// Omit the last mutation of the epoch.
    DropMutation,
    /// Serve a map root hash nobody signed.
    #[default]
    ForgeRoot,
}

#[derive(Clone)]
pub struct KeyServer {
    map: Arc<InMemoryMap>,
    log: Arc<InMemoryLog>,
    queue: InMemoryQueue,
    tampered: Arc<Mutex<BTreeSet<(u64, Tamper)>>>,
}

impl KeyServer {
    pub fn new(map: Arc<InMemoryMap>, log: Arc<InMemoryLog>, queue: InMemoryQueue) -> Self {
        Self {
            map,
            log,
            queue,
            tampered: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Distort every future response for `epoch`.
    pub fn tamper(&self, epoch: u64, how: Tamper) {
        self.tampered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((epoch, how));
    }

    fn is_tampered(&self, epoch: u64, how: Tamper) -> bool {
        self.tampered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&(epoch, how))
    }

    /// Response for `epoch` with a consistency proof from
    /// `first_tree_size`. `None` until the epoch is both written and
    /// anchored.
    pub fn mutations_response(
        &self,
        epoch: u64,
        first_tree_size: u64,
    ) -> Result<Option<MutationsResponse>, BackendError> {
        let Some(map_root) = self.map.root_at(epoch) else {
            return Ok(None);
        };
        let log = self.log.snapshot();
        if log.head.tree_size <= epoch {
            return Ok(None);
        }
        let log_consistency = log.consistency(first_tree_size).ok_or_else(|| {
            BackendError::InvalidArgument(format!(
                "first tree size {first_tree_size} beyond log size {}",
                log.head.tree_size
            ))
        })?;
        let log_inclusion = log
            .inclusion(epoch)
            .ok_or_else(|| BackendError::NotFound(format!("log leaf {epoch}")))?;

        let (previous_map_root, previous_log_inclusion, mutations) = match epoch.checked_sub(1) {
            None => (None, Vec::new(), Vec::new()),
            Some(previous) => {
                let root = self
                    .map
                    .root_at(previous)
                    .ok_or_else(|| BackendError::NotFound(format!("map revision {previous}")))?;
                let inclusion = log
                    .inclusion(previous)
                    .ok_or_else(|| BackendError::NotFound(format!("log leaf {previous}")))?;

                let mut proofs = Vec::new();
                for mutation in self.queue.range(root.high_water_mark(), map_root.high_water_mark()) {
                    let Ok(index) = mutation.index() else { continue };
                    let leaf_proof = self
                        .map
                        .inclusion_at(previous, &index)
                        .ok_or_else(|| BackendError::NotFound(format!("map revision {previous}")))?;
                    proofs.push(MutationProof {
                        mutation,
                        leaf_proof,
                    });
                }
                (Some(root), inclusion, proofs)
            }
        };

        let mut response = MutationsResponse {
            epoch,
            map_root,
            previous_map_root,
            log_root: log.head,
            log_consistency_from: first_tree_size,
            log_consistency,
            log_inclusion,
            previous_log_inclusion,
            mutations,
        };

        if self.is_tampered(epoch, Tamper::DropMutation) {
            response.mutations.pop();
        }
        if self.is_tampered(epoch, Tamper::ForgeRoot) {
            response.map_root.root_hash[0] ^= 0xFF;
        }
        Ok(Some(response))
    }
}

#[async_trait]
impl EpochSource for KeyServer {
    async fn get_epoch(
        &self,
        epoch: u64,
        first_tree_size: u64,
    ) -> Result<Option<MutationsResponse>, BackendError> {
        self.mutations_response(epoch, first_tree_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SteppingClock;
    use merkle::anchor::anchor_leaf;
    use merkle::signing::RootSigner;
    use sequencer::backend::{LogBackend, MapBackend};
    use types::ids::{LogId, MapId};
    use types::map::{MapLeaf, MapperMetadata};
    use types::mutation::MapIndex;

    struct Fixture {
        server: KeyServer,
        map: Arc<InMemoryMap>,
        log: Arc<InMemoryLog>,
        queue: InMemoryQueue,
    }

    fn fixture() -> Fixture {
        let clock = SteppingClock::fixed();
        let map = Arc::new(InMemoryMap::new(MapId::new(1), RootSigner::from_seed([2u8; 32]), clock.clone()));
        let log = Arc::new(InMemoryLog::new(LogId::new(2), RootSigner::from_seed([1u8; 32]), clock));
        let queue = InMemoryQueue::new();
        Fixture {
            server: KeyServer::new(map.clone(), log.clone(), queue.clone()),
            map,
            log,
            queue,
        }
    }

    async fn anchor_latest(f: &Fixture) {
        let root = f.map.get_root(MapId::new(1)).await.unwrap();
        f.log.queue_leaf(LogId::new(2), anchor_leaf(&root).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unanchored_epoch_not_served() {
        let f = fixture();
        assert!(f.server.mutations_response(0, 0).unwrap().is_none());
        anchor_latest(&f).await;
        let genesis = f.server.mutations_response(0, 0).unwrap().unwrap();
        assert_eq!(genesis.epoch, 0);
        assert!(genesis.previous_map_root.is_none());
        assert!(f.server.mutations_response(1, 0).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_response_covers_sequence_window() {
        let f = fixture();
        anchor_latest(&f).await;
        f.queue.enqueue(b"alice".to_vec(), b"x".to_vec());
        f.queue.enqueue(vec![0u8; 40], b"too long".to_vec());
        f.queue.enqueue(b"bob".to_vec(), b"y".to_vec());
        f.map
            .set_leaves(
                MapId::new(1),
                vec![MapLeaf::new(MapIndex::from_key(b"alice").unwrap(), b"x".to_vec())],
                MapperMetadata { high_water_mark: 3 },
            )
            .await
            .unwrap();
        anchor_latest(&f).await;

        let response = f.server.mutations_response(1, 1).unwrap().unwrap();
        let seqs: Vec<u64> = response.mutations.iter().map(|p| p.mutation.sequence).collect();
        assert_eq!(seqs, vec![1, 3]);
        assert_eq!(response.log_root.tree_size, 2);
        assert_eq!(response.log_consistency_from, 1);
        assert!(response.mutations.iter().all(|p| p.leaf_proof.value.is_none()));
    }

    #[tokio::test]
    async fn test_first_tree_size_beyond_log() {
        let f = fixture();
        anchor_latest(&f).await;
        assert!(matches!(
            f.server.mutations_response(0, 5),
            Err(BackendError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_tamper_forges_root() {
        let f = fixture();
        anchor_latest(&f).await;
        let honest = f.server.mutations_response(0, 0).unwrap().unwrap();
        f.server.tamper(0, Tamper::ForgeRoot);
        let forged = f.server.mutations_response(0, 0).unwrap().unwrap();
        assert_ne!(honest.map_root.root_hash, forged.map_root.root_hash);
    }
}
