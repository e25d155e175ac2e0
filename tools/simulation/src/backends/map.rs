//! In-memory verifiable map

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use merkle::map::SparseMerkleTree;
use merkle::signing::RootSigner;
use sequencer::backend::MapBackend;
use sequencer::timing::Clock;
use types::errors::BackendError;
use types::ids::MapId;
use types::map::{MapLeaf, MapLeafInclusion, MapperMetadata, SignedMapRoot};
use types::mutation::MapIndex;

use super::FaultSwitch;

struct Revision {
    root: SignedMapRoot,
    tree: SparseMerkleTree,
}

/// Map backend that keeps a full snapshot per revision.
pub struct InMemoryMap {
    map_id: MapId,
    signer: RootSigner,
    clock: Arc<dyn Clock>,
    revisions: Mutex<Vec<Revision>>,
    /// Fail the next `get_root` calls.
    pub head_faults: FaultSwitch,
    /// Fail the next `set_leaves` calls.
    pub write_faults: FaultSwitch,
}

impl InMemoryMap {
    /// A map at revision 0 with no leaves.
    pub fn new(map_id: MapId, signer: RootSigner, clock: Arc<dyn Clock>) -> Self {
        let tree = SparseMerkleTree::new();
        let genesis = sign_revision(&signer, clock.as_ref(), map_id, 0, &tree, MapperMetadata::default());
        Self {
            map_id,
            signer,
            clock,
            revisions: Mutex::new(vec![Revision { root: genesis, tree }]),
            head_faults: FaultSwitch::default(),
            write_faults: FaultSwitch::default(),
        }
    }

    pub fn verifying_key_hex(&self) -> String {
        self.signer.verifying_key_hex()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Revision>> {
        self.revisions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_id(&self, map_id: MapId) -> Result<(), BackendError> {
        if map_id != self.map_id {
            return Err(BackendError::NotFound(format!("map {map_id}")));
        }
        Ok(())
    }

    pub fn latest_revision(&self) -> u64 {
        self.lock().len() as u64 - 1
    }

    /// Signed root of `revision`, if it exists.
    pub fn root_at(&self, revision: u64) -> Option<SignedMapRoot> {
        self.lock().get(revision as usize).map(|r| r.root.clone())
    }

    /// Leaf and proof for `index` at `revision`.
    pub fn inclusion_at(&self, revision: u64, index: &MapIndex) -> Option<MapLeafInclusion> {
        self.lock().get(revision as usize).map(|r| r.tree.inclusion(index))
    }

    /// Current value at `index`.
    pub fn value(&self, index: &MapIndex) -> Option<Vec<u8>> {
        self.lock()
            .last()
            .and_then(|r| r.tree.get(index).map(<[u8]>::to_vec))
    }

    pub fn leaf_count(&self) -> usize {
        self.lock().last().map(|r| r.tree.len()).unwrap_or(0)
    }
}

fn sign_revision(
    signer: &RootSigner,
    clock: &dyn Clock,
    map_id: MapId,
    revision: u64,
    tree: &SparseMerkleTree,
    metadata: MapperMetadata,
) -> SignedMapRoot {
    signer.sign_map_root(SignedMapRoot {
        map_id,
        revision,
        root_hash: tree.root(),
        timestamp_nanos: clock.now().timestamp_nanos_opt().unwrap_or(0),
        metadata,
        signature: Vec::new(),
    })
}

#[async_trait]
impl MapBackend for InMemoryMap {
    async fn get_root(&self, map_id: MapId) -> Result<SignedMapRoot, BackendError> {
        self.check_id(map_id)?;
        if self.head_faults.trip() {
            return Err(BackendError::Unavailable("map head unavailable".to_string()));
        }
        self.lock()
            .last()
            .map(|r| r.root.clone())
            .ok_or_else(|| BackendError::NotFound(format!("map {map_id} has no revisions")))
    }

    async fn get_leaves(
        &self,
        map_id: MapId,
        indexes: &[MapIndex],
        revision: Option<u64>,
    ) -> Result<Vec<MapLeafInclusion>, BackendError> {
        self.check_id(map_id)?;
        let revisions = self.lock();
        let snapshot = match revision {
            Some(rev) => revisions
                .get(rev as usize)
                .ok_or_else(|| BackendError::InvalidArgument(format!("unknown revision {rev}")))?,
            None => revisions
                .last()
                .ok_or_else(|| BackendError::NotFound(format!("map {map_id} has no revisions")))?,
        };
        Ok(indexes.iter().map(|index| snapshot.tree.inclusion(index)).collect())
    }

    async fn set_leaves(
        &self,
        map_id: MapId,
        leaves: Vec<MapLeaf>,
        metadata: MapperMetadata,
    ) -> Result<SignedMapRoot, BackendError> {
        self.check_id(map_id)?;
        if self.write_faults.trip() {
            return Err(BackendError::Unavailable("map write rejected".to_string()));
        }

        let mut revisions = self.lock();
        let (mut tree, revision) = match revisions.last() {
            Some(last) => (last.tree.clone(), last.root.revision + 1),
            None => (SparseMerkleTree::new(), 0),
        };
        let written = leaves.len();
        tree.apply(leaves);
        let root = sign_revision(&self.signer, self.clock.as_ref(), map_id, revision, &tree, metadata);
        debug!(
            map_id = %map_id,
            revision,
            leaves = written,
            high_water_mark = metadata.high_water_mark,
            "Map revision written"
        );
        revisions.push(Revision {
            root: root.clone(),
            tree,
        });
        Ok(root)
    }
}
