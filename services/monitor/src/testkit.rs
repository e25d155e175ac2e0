//! Honest epoch chain for unit tests.
//!
//! Keeps a sparse map and a log in lockstep and emits the response an
//! honest key server would serve for each new epoch, together with the
//! trusted state a monitor holds just before it.

use merkle::anchor::anchored_leaf_hash;
use merkle::log::{consistency_proof, inclusion_proof, root as log_root};
use merkle::map::SparseMerkleTree;
use merkle::signing::RootSigner;
use sequencer::mutator::EntryMutator;
use sequencer::resolver::apply_mutations;
use types::ids::{Hash, LogId, MapId};
use types::log::SignedLogRoot;
use types::map::{MapLeaf, MapperMetadata, SignedMapRoot};
use types::mutation::Mutation;
use types::response::{MutationProof, MutationsResponse};

use crate::verifier::TrustedState;

pub struct EpochFixture {
    pub response: MutationsResponse,
    pub trusted_before: TrustedState,
}

pub struct FixtureChain {
    pub log_signer: RootSigner,
    pub map_signer: RootSigner,
    tree: SparseMerkleTree,
    roots: Vec<SignedMapRoot>,
    log_leaves: Vec<Hash>,
    log_heads: Vec<SignedLogRoot>,
    mutator: EntryMutator,
}

impl FixtureChain {
    pub fn new() -> Self {
        Self {
            log_signer: RootSigner::from_seed([1u8; 32]),
            map_signer: RootSigner::from_seed([2u8; 32]),
            tree: SparseMerkleTree::new(),
            roots: Vec::new(),
            log_leaves: Vec::new(),
            log_heads: Vec::new(),
            mutator: EntryMutator::new(),
        }
    }

    /// Revision 0, the empty map.
    pub fn genesis(&mut self) -> EpochFixture {
        assert!(self.roots.is_empty(), "genesis already created");
        let root = self.sign_revision(0, 0);
        self.anchor(&root);
        self.fixture(root, None, Vec::new())
    }

    /// Apply `mutations` as the next epoch, creating genesis first if needed.
    pub fn advance(&mut self, mutations: Vec<Mutation>) -> EpochFixture {
        if self.roots.is_empty() {
            self.genesis();
        }
        let previous = self.roots[self.roots.len() - 1].clone();

        let proofs: Vec<MutationProof> = mutations
            .iter()
            .filter_map(|m| {
                let index = m.index().ok()?;
                Some(MutationProof {
                    mutation: m.clone(),
                    leaf_proof: self.tree.inclusion(&index),
                })
            })
            .collect();
        let current: Vec<MapLeaf> = proofs.iter().filter_map(|p| p.leaf_proof.leaf()).collect();
        let resolved = apply_mutations(&self.mutator, &mutations, &current);
        self.tree.apply(resolved.leaves);

        let max_seq = mutations.iter().map(|m| m.sequence).max().unwrap_or(0);
        let hwm = previous.high_water_mark().max(max_seq);
        let root = self.sign_revision(previous.revision + 1, hwm);
        self.anchor(&root);
        self.fixture(root, Some(previous), proofs)
    }

    fn sign_revision(&mut self, revision: u64, high_water_mark: u64) -> SignedMapRoot {
        let root = self.map_signer.sign_map_root(SignedMapRoot {
            map_id: MapId::new(1),
            revision,
            root_hash: self.tree.root(),
            timestamp_nanos: 1_700_000_000_000_000_000 + revision as i64,
            metadata: MapperMetadata { high_water_mark },
            signature: Vec::new(),
        });
        self.roots.push(root.clone());
        root
    }

    fn anchor(&mut self, root: &SignedMapRoot) {
        self.log_leaves.push(anchored_leaf_hash(root).unwrap());
        let head = self.log_signer.sign_log_root(SignedLogRoot {
            log_id: LogId::new(2),
            tree_size: self.log_leaves.len() as u64,
            root_hash: log_root(&self.log_leaves),
            timestamp_nanos: root.timestamp_nanos,
            signature: Vec::new(),
        });
        self.log_heads.push(head);
    }

    fn fixture(
        &self,
        map_root: SignedMapRoot,
        previous_map_root: Option<SignedMapRoot>,
        mutations: Vec<MutationProof>,
    ) -> EpochFixture {
        let epoch = map_root.revision as usize;
        let head = self.log_heads[epoch].clone();
        let trusted_log = epoch.checked_sub(1).map(|i| self.log_heads[i].clone());
        let from = trusted_log.as_ref().map(|h| h.tree_size).unwrap_or(0);

        let response = MutationsResponse {
            epoch: map_root.revision,
            log_consistency_from: from,
            log_consistency: consistency_proof(&self.log_leaves, from as usize).unwrap(),
            log_inclusion: inclusion_proof(&self.log_leaves, epoch).unwrap(),
            previous_log_inclusion: epoch
                .checked_sub(1)
                .map(|i| inclusion_proof(&self.log_leaves, i).unwrap())
                .unwrap_or_default(),
            map_root,
            previous_map_root: previous_map_root.clone(),
            log_root: head,
            mutations,
        };

        EpochFixture {
            response,
            trusted_before: TrustedState {
                log_root: trusted_log,
                map_root: previous_map_root,
            },
        }
    }
}
