//! Mutation Verifier
//!
//! Re-derives, from a [`MutationsResponse`] alone, whether the epoch it
//! describes is a valid append-only state transition:
//!
//! 1. log head signature and consistency with the last trusted log head
//! 2. map head signature, revision, and inclusion in the log at its epoch
//! 3. previous map head signature, inclusion, and agreement with the
//!    trusted map head
//! 4. per mutation: key canonicalization, old-leaf proof against the
//!    previous root, sequence window and ordering
//! 5. conflict resolution re-run and recomputation of the new root
//!
//! Verification is pure. The same response and trusted state always give
//! the same ordered list of distinct failures.

use std::collections::BTreeMap;
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;

use merkle::anchor::anchored_leaf_hash;
use merkle::log::{verify_consistency, verify_inclusion};
use merkle::map::{empty_map_root, root_from_updates, verify_map_inclusion, LeafUpdate};
use merkle::signing::{verify_log_root, verify_map_root};
use sequencer::mutator::Mutator;
use sequencer::resolver::apply_mutations;
use types::ids::Hash;
use types::log::SignedLogRoot;
use types::map::{MapLeaf, SignedMapRoot};
use types::monitoring::VerificationError;
use types::mutation::{MapIndex, Mutation};
use types::response::MutationsResponse;

/// Heads the monitor has already verified.
///
/// With no trusted log head the first verified head is accepted on first
/// use; consistency is checked from then on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedState {
    pub log_root: Option<SignedLogRoot>,
    pub map_root: Option<SignedMapRoot>,
}

/// Ordered list of distinct failures.
#[derive(Debug, Default)]
struct Failures(Vec<VerificationError>);

impl Failures {
    fn push(&mut self, error: VerificationError) {
        if !self.0.contains(&error) {
            self.0.push(error);
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Verifier {
    log_key: VerifyingKey,
    map_key: VerifyingKey,
    mutator: Arc<dyn Mutator>,
}

impl Verifier {
    pub fn new(log_key: VerifyingKey, map_key: VerifyingKey, mutator: Arc<dyn Mutator>) -> Self {
        Self {
            log_key,
            map_key,
            mutator,
        }
    }

    /// Verify `response` against `trusted`. An empty list means success.
    pub fn verify(
        &self,
        response: &MutationsResponse,
        trusted: &TrustedState,
    ) -> Vec<VerificationError> {
        let mut failures = Failures::default();

        self.check_log(response, trusted, &mut failures);
        self.check_map_root(response, &mut failures);

        if response.epoch == 0 {
            check_genesis(response, &mut failures);
            return failures.0;
        }

        let Some(previous) = response.previous_map_root.as_ref() else {
            failures.push(VerificationError::MissingPreviousRoot {
                epoch: response.epoch,
            });
            return failures.0;
        };
        self.check_previous_root(response, previous, trusted, &mut failures);

        let mutations_ok = check_mutations(response, previous, &mut failures);
        if mutations_ok {
            self.check_transition(response, previous, &mut failures);
        }

        failures.0
    }

    fn check_log(&self, response: &MutationsResponse, trusted: &TrustedState, failures: &mut Failures) {
        let log_root = &response.log_root;
        if verify_log_root(&self.log_key, log_root).is_err() {
            failures.push(VerificationError::LogRootSignature {
                tree_size: log_root.tree_size,
            });
        }

        let Some(trusted_log) = trusted.log_root.as_ref() else {
            return;
        };
        let consistent = response.log_consistency_from == trusted_log.tree_size
            && verify_consistency(
                trusted_log.tree_size,
                log_root.tree_size,
                &trusted_log.root_hash,
                &log_root.root_hash,
                &response.log_consistency,
            )
            .is_ok();
        if !consistent {
            failures.push(VerificationError::LogConsistency {
                from_size: trusted_log.tree_size,
                to_size: log_root.tree_size,
            });
        }
    }

    fn check_map_root(&self, response: &MutationsResponse, failures: &mut Failures) {
        let map_root = &response.map_root;
        if verify_map_root(&self.map_key, map_root).is_err() {
            failures.push(VerificationError::MapRootSignature {
                revision: map_root.revision,
            });
        }
        if map_root.revision != response.epoch {
            failures.push(VerificationError::EpochMismatch {
                epoch: response.epoch,
                revision: map_root.revision,
            });
        }
        if !anchored_at(map_root, response.epoch, &response.log_root, &response.log_inclusion) {
            failures.push(VerificationError::MapRootInclusion {
                revision: map_root.revision,
                tree_size: response.log_root.tree_size,
            });
        }
    }

    fn check_previous_root(
        &self,
        response: &MutationsResponse,
        previous: &SignedMapRoot,
        trusted: &TrustedState,
        failures: &mut Failures,
    ) {
        let expected = response.epoch - 1;
        if verify_map_root(&self.map_key, previous).is_err() {
            failures.push(VerificationError::MapRootSignature {
                revision: previous.revision,
            });
        }
        if previous.revision != expected {
            failures.push(VerificationError::EpochMismatch {
                epoch: expected,
                revision: previous.revision,
            });
        }
        if !anchored_at(previous, expected, &response.log_root, &response.previous_log_inclusion) {
            failures.push(VerificationError::MapRootInclusion {
                revision: previous.revision,
                tree_size: response.log_root.tree_size,
            });
        }
        if let Some(trusted_map) = trusted.map_root.as_ref() {
            if trusted_map.revision == previous.revision && trusted_map != previous {
                failures.push(VerificationError::PreviousRootMismatch {
                    revision: previous.revision,
                });
            }
        }

        let (before, after) = (previous.high_water_mark(), response.map_root.high_water_mark());
        if after < before {
            failures.push(VerificationError::HighWaterMarkRegression {
                previous: before,
                current: after,
            });
        }
    }

    /// Re-run conflict resolution and compare the recomputed root.
    fn check_transition(&self, response: &MutationsResponse, previous: &SignedMapRoot, failures: &mut Failures) {
        let revision = response.map_root.revision;

        // One proof per index; all were checked against the previous root.
        let mut proofs: BTreeMap<MapIndex, &[Hash]> = BTreeMap::new();
        let mut current: BTreeMap<MapIndex, MapLeaf> = BTreeMap::new();
        for proof in &response.mutations {
            let leaf = &proof.leaf_proof;
            proofs.entry(leaf.index).or_insert(leaf.inclusion.as_slice());
            if let Some(existing) = leaf.leaf() {
                current.entry(leaf.index).or_insert(existing);
            }
        }

        let mutations: Vec<Mutation> = response.mutations.iter().map(|p| p.mutation.clone()).collect();
        let current: Vec<MapLeaf> = current.into_values().collect();
        let resolved = apply_mutations(self.mutator.as_ref(), &mutations, &current);

        let recomputed = if resolved.leaves.is_empty() {
            Some(previous.root_hash)
        } else {
            let mut updates = Vec::with_capacity(resolved.leaves.len());
            for leaf in &resolved.leaves {
                match proofs.get(&leaf.index) {
                    Some(proof) => updates.push(LeafUpdate {
                        index: leaf.index,
                        value: &leaf.value,
                        proof,
                    }),
                    None => {
                        failures.push(VerificationError::RootMismatch { revision });
                        return;
                    }
                }
            }
            root_from_updates(&updates).ok()
        };

        if recomputed != Some(response.map_root.root_hash) {
            failures.push(VerificationError::RootMismatch { revision });
        }
    }
}

/// Genesis must be the empty map with nothing applied.
fn check_genesis(response: &MutationsResponse, failures: &mut Failures) {
    let revision = response.map_root.revision;
    if !response.mutations.is_empty() || response.map_root.root_hash != empty_map_root() {
        failures.push(VerificationError::RootMismatch { revision });
    }
}

/// Per-mutation structure. Returns false when any mutation failed, in
/// which case the root recomputation is skipped.
fn check_mutations(response: &MutationsResponse, previous: &SignedMapRoot, failures: &mut Failures) -> bool {
    let before = failures.0.len();
    let low = previous.high_water_mark();
    let high = response.map_root.high_water_mark();
    let mut last: Option<u64> = None;

    for proof in &response.mutations {
        let mutation = &proof.mutation;
        let sequence = mutation.sequence;

        if sequence <= low || sequence > high {
            failures.push(VerificationError::SequenceOutOfRange { sequence, low, high });
        }
        if let Some(prev) = last {
            if sequence <= prev {
                failures.push(VerificationError::SequenceOrder {
                    sequence,
                    previous: prev,
                });
            }
        }
        last = Some(sequence);

        let index = match mutation.index() {
            Ok(index) => index,
            Err(e) => {
                failures.push(VerificationError::MalformedMutation {
                    sequence,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let leaf = &proof.leaf_proof;
        if leaf.index != index {
            failures.push(VerificationError::IndexMismatch { sequence });
            continue;
        }
        if verify_map_inclusion(&previous.root_hash, &index, leaf.value.as_deref(), &leaf.inclusion).is_err() {
            failures.push(VerificationError::LeafInclusion { sequence });
        }
    }

    failures.0.len() == before
}

fn anchored_at(root: &SignedMapRoot, index: u64, log_root: &SignedLogRoot, proof: &[Hash]) -> bool {
    match anchored_leaf_hash(root) {
        Ok(leaf) => verify_inclusion(index, log_root.tree_size, &leaf, proof, &log_root.root_hash).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{EpochFixture, FixtureChain};
    use merkle::signing::RootSigner;
    use sequencer::mutator::{EntryMutator, EntryUpdate};

    fn verifier(chain: &FixtureChain) -> Verifier {
        Verifier::new(
            chain.log_signer.verifying_key(),
            chain.map_signer.verifying_key(),
            Arc::new(EntryMutator::new()),
        )
    }

    fn two_epoch_chain() -> (FixtureChain, EpochFixture) {
        let mut chain = FixtureChain::new();
        chain.advance(Vec::new());
        let a = EntryUpdate::chained(None, b"alice-v1".to_vec()).unwrap();
        let b = EntryUpdate::chained(None, b"bob-v1".to_vec()).unwrap();
        let epoch = chain.advance(vec![
            Mutation::new(1, b"alice".to_vec(), a.encode().unwrap()),
            Mutation::new(2, b"bob".to_vec(), b.encode().unwrap()),
        ]);
        (chain, epoch)
    }

    #[test]
    fn test_honest_epoch_verifies() {
        let (chain, epoch) = two_epoch_chain();
        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert!(errors.is_empty(), "unexpected failures: {errors:?}");
    }

    #[test]
    fn test_genesis_verifies_without_trust() {
        let mut chain = FixtureChain::new();
        let genesis = chain.genesis();
        let errors = verifier(&chain).verify(&genesis.response, &TrustedState::default());
        assert!(errors.is_empty(), "unexpected failures: {errors:?}");
    }

    #[test]
    fn test_forced_empty_epoch_verifies() {
        let mut chain = FixtureChain::new();
        chain.advance(Vec::new());
        let epoch = chain.advance(Vec::new());
        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert!(errors.is_empty(), "unexpected failures: {errors:?}");
    }

    #[test]
    fn test_rejected_mutation_tolerated() {
        let mut chain = FixtureChain::new();
        chain.advance(Vec::new());
        let ok = EntryUpdate::chained(None, b"d".to_vec()).unwrap();
        let epoch = chain.advance(vec![
            Mutation::new(1, b"carol".to_vec(), b"not an update".to_vec()),
            Mutation::new(2, b"dave".to_vec(), ok.encode().unwrap()),
        ]);
        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert!(errors.is_empty(), "unexpected failures: {errors:?}");
    }

    #[test]
    fn test_wrong_map_key_flags_both_roots() {
        let (chain, epoch) = two_epoch_chain();
        let stranger = RootSigner::from_seed([9u8; 32]);
        let verifier = Verifier::new(
            chain.log_signer.verifying_key(),
            stranger.verifying_key(),
            Arc::new(EntryMutator::new()),
        );
        let errors = verifier.verify(&epoch.response, &epoch.trusted_before);
        assert_eq!(
            errors,
            vec![
                VerificationError::MapRootSignature { revision: 2 },
                VerificationError::MapRootSignature { revision: 1 },
            ]
        );
    }

    #[test]
    fn test_forged_root_hash_detected() {
        let (chain, mut epoch) = two_epoch_chain();
        let mut forged = epoch.response.map_root.clone();
        forged.root_hash = [0xAB; 32];
        epoch.response.map_root = chain.map_signer.sign_map_root(forged);

        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        // Re-signed, so only the log anchor and the recomputation disagree.
        assert_eq!(
            errors,
            vec![
                VerificationError::MapRootInclusion {
                    revision: 2,
                    tree_size: 3
                },
                VerificationError::RootMismatch { revision: 2 },
            ]
        );
    }

    #[test]
    fn test_dropped_mutation_detected() {
        let (chain, mut epoch) = two_epoch_chain();
        epoch.response.mutations.pop();
        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert_eq!(errors, vec![VerificationError::RootMismatch { revision: 2 }]);
    }

    #[test]
    fn test_tampered_leaf_proof_detected() {
        let (chain, mut epoch) = two_epoch_chain();
        epoch.response.mutations[0].leaf_proof.inclusion[0] = [0x11; 32];
        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert_eq!(errors, vec![VerificationError::LeafInclusion { sequence: 1 }]);
    }

    #[test]
    fn test_index_mismatch_detected() {
        let (chain, mut epoch) = two_epoch_chain();
        let other = epoch.response.mutations[1].leaf_proof.clone();
        epoch.response.mutations[0].leaf_proof = other;
        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert_eq!(errors, vec![VerificationError::IndexMismatch { sequence: 1 }]);
    }

    #[test]
    fn test_sequence_window_and_order() {
        let (chain, mut epoch) = two_epoch_chain();
        epoch.response.mutations.swap(0, 1);
        epoch.response.mutations[1].mutation.sequence = 7;
        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert_eq!(
            errors,
            vec![VerificationError::SequenceOutOfRange {
                sequence: 7,
                low: 0,
                high: 2
            }]
        );

        let (chain, mut epoch) = two_epoch_chain();
        epoch.response.mutations.swap(0, 1);
        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert_eq!(
            errors,
            vec![VerificationError::SequenceOrder {
                sequence: 1,
                previous: 2
            }]
        );
    }

    #[test]
    fn test_missing_previous_root() {
        let (chain, mut epoch) = two_epoch_chain();
        epoch.response.previous_map_root = None;
        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert_eq!(errors, vec![VerificationError::MissingPreviousRoot { epoch: 2 }]);
    }

    #[test]
    fn test_previous_root_must_match_trusted() {
        let (chain, epoch) = two_epoch_chain();
        let mut trusted = epoch.trusted_before.clone();
        let mut other = trusted.map_root.clone().unwrap();
        other.timestamp_nanos += 1;
        trusted.map_root = Some(chain.map_signer.sign_map_root(other));

        let errors = verifier(&chain).verify(&epoch.response, &trusted);
        assert_eq!(errors, vec![VerificationError::PreviousRootMismatch { revision: 1 }]);
    }

    #[test]
    fn test_inconsistent_log_detected() {
        let (chain, epoch) = two_epoch_chain();
        let mut trusted = epoch.trusted_before.clone();
        let mut fork = trusted.log_root.clone().unwrap();
        fork.root_hash = [0x22; 32];
        trusted.log_root = Some(chain.log_signer.sign_log_root(fork));

        let errors = verifier(&chain).verify(&epoch.response, &trusted);
        assert_eq!(
            errors,
            vec![VerificationError::LogConsistency {
                from_size: 2,
                to_size: 3
            }]
        );
    }

    #[test]
    fn test_high_water_mark_regression() {
        let (chain, mut epoch) = two_epoch_chain();
        let mut previous = epoch.response.previous_map_root.clone().unwrap();
        previous.metadata.high_water_mark = 50;
        epoch.response.previous_map_root = Some(chain.map_signer.sign_map_root(previous));

        let errors = verifier(&chain).verify(&epoch.response, &epoch.trusted_before);
        assert!(errors.contains(&VerificationError::HighWaterMarkRegression {
            previous: 50,
            current: 2
        }));
    }

    #[test]
    fn test_verification_is_deterministic() {
        let (chain, mut epoch) = two_epoch_chain();
        epoch.response.mutations.pop();
        let v = verifier(&chain);
        let first = v.verify(&epoch.response, &epoch.trusted_before);
        for _ in 0..5 {
            assert_eq!(v.verify(&epoch.response, &epoch.trusted_before), first);
        }
    }
}
