//! Fire-and-forget root publication to the witness
//!
//! Each publish runs in its own task with its own deadline. Failures go to
//! a bounded error channel and the log; they never reach the epoch cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use types::errors::BackendError;
use types::ids::WitnessKey;

use crate::backend::Witness;

/// Error channel depth; failures beyond it are only logged.
const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// A publish that did not reach the witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessFailure {
    pub key: WitnessKey,
    pub error: BackendError,
}

#[derive(Clone)]
pub struct WitnessPublisher {
    witness: Arc<dyn Witness>,
    timeout: Duration,
    failures: mpsc::Sender<WitnessFailure>,
}

impl WitnessPublisher {
    pub fn new(witness: Arc<dyn Witness>, timeout: Duration) -> (Self, mpsc::Receiver<WitnessFailure>) {
        let (failures, rx) = mpsc::channel(FAILURE_CHANNEL_CAPACITY);
        (
            Self {
                witness,
                timeout,
                failures,
            },
            rx,
        )
    }

    /// Publish `root_hash` under `key` in the background.
    pub fn publish(&self, key: WitnessKey, root_hash: Vec<u8>) {
        let witness = Arc::clone(&self.witness);
        let failures = self.failures.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, witness.put_root_hash(&key, root_hash)).await;
            let error = match outcome {
                Ok(Ok(())) => {
                    info!(key = %key, "Published root hash to witness");
                    return;
                }
                Ok(Err(e)) => e,
                Err(_) => BackendError::DeadlineExceeded,
            };
            warn!(key = %key, error = %error, "Witness publish failed");
            // A full or closed channel only loses the report, not the log line.
            let _ = failures.try_send(WitnessFailure { key, error });
        });
    }
}
