//! Advisory witness cross-check
//!
//! Compares the root hash the monitor observed for `(map id, epoch)` with
//! the one an independent witness published. Runs in the background with
//! its own deadline; the outcome is logged and reported on a channel and
//! never touches the stored monitoring result.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sequencer::backend::Witness;
use types::ids::{Hash, WitnessKey};

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossCheckOutcome {
    Match,
    Mismatch { witness: Vec<u8> },
    /// The witness has nothing under this key.
    NotPublished,
    /// The witness failed or timed out.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossCheckReport {
    pub key: WitnessKey,
    pub outcome: CrossCheckOutcome,
}

#[derive(Clone)]
pub struct CrossChecker {
    witness: Arc<dyn Witness>,
    timeout: Duration,
    reports: mpsc::Sender<CrossCheckReport>,
}

impl CrossChecker {
    pub fn new(witness: Arc<dyn Witness>, timeout: Duration) -> (Self, mpsc::Receiver<CrossCheckReport>) {
        let (reports, rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        (
            Self {
                witness,
                timeout,
                reports,
            },
            rx,
        )
    }

    /// Start a background comparison of `observed` against the witness.
    pub fn spawn(&self, key: WitnessKey, observed: Hash) {
        let witness = Arc::clone(&self.witness);
        let reports = self.reports.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, witness.get_root_hash(&key)).await {
                Ok(Ok(Some(published))) if published.as_slice() == observed.as_slice() => {
                    info!(key = %key, "Witness root hash matches");
                    CrossCheckOutcome::Match
                }
                Ok(Ok(Some(published))) => {
                    warn!(
                        key = %key,
                        observed = %merkle::hash::to_hex(&observed),
                        witness = %hex::encode(&published),
                        "Witness root hash mismatch"
                    );
                    CrossCheckOutcome::Mismatch { witness: published }
                }
                Ok(Ok(None)) => {
                    debug!(key = %key, "Witness has no root hash");
                    CrossCheckOutcome::NotPublished
                }
                Ok(Err(e)) => {
                    warn!(key = %key, error = %e, "Witness lookup failed");
                    CrossCheckOutcome::Unavailable
                }
                Err(_) => {
                    warn!(key = %key, "Witness lookup timed out");
                    CrossCheckOutcome::Unavailable
                }
            };
            let _ = reports.try_send(CrossCheckReport { key, outcome });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use types::errors::BackendError;
    use types::ids::MapId;

    #[derive(Default)]
    struct StaticWitness {
        hashes: Mutex<BTreeMap<WitnessKey, Vec<u8>>>,
        down: bool,
        hang: bool,
    }

    #[async_trait]
    impl Witness for StaticWitness {
        async fn get_root_hash(&self, key: &WitnessKey) -> Result<Option<Vec<u8>>, BackendError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.down {
                return Err(BackendError::Unavailable("witness down".to_string()));
            }
            Ok(self.hashes.lock().unwrap().get(key).cloned())
        }

        async fn put_root_hash(&self, key: &WitnessKey, hash: Vec<u8>) -> Result<(), BackendError> {
            self.hashes.lock().unwrap().insert(*key, hash);
            Ok(())
        }
    }

    async fn run(witness: StaticWitness, observed: Hash) -> CrossCheckOutcome {
        let (checker, mut reports) = CrossChecker::new(Arc::new(witness), Duration::from_millis(500));
        checker.spawn(WitnessKey::new(MapId::new(1), 5), observed);
        reports.recv().await.unwrap().outcome
    }

    fn publishing(hash: Vec<u8>) -> StaticWitness {
        let witness = StaticWitness::default();
        witness
            .hashes
            .lock()
            .unwrap()
            .insert(WitnessKey::new(MapId::new(1), 5), hash);
        witness
    }

    #[tokio::test]
    async fn test_match() {
        assert_eq!(run(publishing(vec![4u8; 32]), [4u8; 32]).await, CrossCheckOutcome::Match);
    }

    #[tokio::test]
    async fn test_mismatch() {
        assert_eq!(
            run(publishing(vec![5u8; 32]), [4u8; 32]).await,
            CrossCheckOutcome::Mismatch { witness: vec![5u8; 32] }
        );
    }

    #[tokio::test]
    async fn test_not_published() {
        assert_eq!(run(StaticWitness::default(), [4u8; 32]).await, CrossCheckOutcome::NotPublished);
    }

    #[tokio::test]
    async fn test_witness_down() {
        let witness = StaticWitness {
            down: true,
            ..Default::default()
        };
        assert_eq!(run(witness, [4u8; 32]).await, CrossCheckOutcome::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_witness_times_out() {
        let witness = StaticWitness {
            hang: true,
            ..Default::default()
        };
        assert_eq!(run(witness, [4u8; 32]).await, CrossCheckOutcome::Unavailable);
    }
}
