//! Monitor
//!
//! Per response: verify, countersign on success, persist the outcome, and
//! kick off the advisory witness cross-check.
//!
//! ```text
//! received ──verify──► 0 failures ──countersign──► verified ─┐
//!              │                                             ├─► ResultStore::set
//!              └─────► failures ─────────────────► failed  ──┘
//! ```
//!
//! The trusted log and map heads only advance past a verified epoch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use merkle::signing::RootSigner;
use sequencer::metrics::{MetricsSink, MONITOR_RESULTS_STORED, MONITOR_VERIFICATION_FAILURES};
use sequencer::timing::Clock;
use types::errors::BackendError;
use types::ids::{MapId, WitnessKey};
use types::monitoring::MonitoringResult;
use types::response::MutationsResponse;

use crate::crosscheck::CrossChecker;
use crate::error::MonitorError;
use crate::storage::ResultStore;
use crate::verifier::{TrustedState, Verifier};

/// Where the monitor fetches epochs from.
#[async_trait]
pub trait EpochSource: Send + Sync {
    /// Response for `epoch` with a log consistency proof starting at
    /// `first_tree_size`, or `None` if the epoch does not exist yet.
    async fn get_epoch(
        &self,
        epoch: u64,
        first_tree_size: u64,
    ) -> Result<Option<MutationsResponse>, BackendError>;
}

pub struct Monitor {
    map_id: MapId,
    verifier: Verifier,
    signer: RootSigner,
    store: Arc<dyn ResultStore>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    cross_check: Option<CrossChecker>,
    trusted: Mutex<TrustedState>,
}

impl Monitor {
    pub fn new(
        map_id: MapId,
        verifier: Verifier,
        signer: RootSigner,
        store: Arc<dyn ResultStore>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // Resume from the last verified root a durable store remembers;
        // failed epochs carry no root to trust.
        let map_root = store
            .latest_verified()
            .and_then(|result| result.signed_root)
            .map(|signed| signed.root);
        if let Some(root) = &map_root {
            info!(map_id = %map_id, revision = root.revision, "Resuming from stored map root");
        }

        Self {
            map_id,
            verifier,
            signer,
            store,
            metrics,
            clock,
            cross_check: None,
            trusted: Mutex::new(TrustedState {
                log_root: None,
                map_root,
            }),
        }
    }

    pub fn with_cross_check(mut self, checker: CrossChecker) -> Self {
        self.cross_check = Some(checker);
        self
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    pub async fn trusted_state(&self) -> TrustedState {
        self.trusted.lock().await.clone()
    }

    /// Verify and record one response.
    ///
    /// Verification failures are recorded, not returned; the error path is
    /// reserved for a result that could not be stored.
    pub async fn process(&self, response: MutationsResponse) -> Result<MonitoringResult, MonitorError> {
        let seen_nanos = self.clock.now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let epoch = response.epoch;
        let observed = response.map_root.root_hash;

        // Held to the end so concurrent calls see a consistent trusted head.
        let mut trusted = self.trusted.lock().await;
        let errors = self.verifier.verify(&response, &trusted);

        let (signed_root, kept_response) = if errors.is_empty() {
            (Some(self.signer.countersign(&response.map_root)), None)
        } else {
            (None, Some(response.clone()))
        };

        // Durable stores fsync on every set; keep that off the runtime threads.
        let store = self.store.clone();
        let record = (signed_root.clone(), kept_response.clone(), errors.clone());
        let stored = tokio::task::spawn_blocking(move || {
            let (signed_root, response, errors) = record;
            store.set(epoch, seen_nanos, signed_root, response, errors)
        })
        .await?;
        if let Err(e) = stored {
            error!(epoch, error = %e, "Failed to store monitoring result");
            return Err(e.into());
        }
        self.metrics.add(MONITOR_RESULTS_STORED, 1);

        if errors.is_empty() {
            info!(
                epoch,
                root_hash = %response.map_root.root_hash_hex(),
                high_water_mark = response.map_root.high_water_mark(),
                "Verified epoch"
            );
            trusted.log_root = Some(response.log_root.clone());
            trusted.map_root = Some(response.map_root.clone());
        } else {
            self.metrics.add(MONITOR_VERIFICATION_FAILURES, 1);
            for failure in &errors {
                warn!(epoch, failure = %failure, "Verification failure");
            }
        }
        drop(trusted);

        if let Some(checker) = &self.cross_check {
            checker.spawn(WitnessKey::new(self.map_id, epoch), observed);
        }

        Ok(MonitoringResult {
            epoch,
            seen_nanos,
            signed_root,
            errors,
            response: kept_response,
        })
    }

    /// First epoch not yet in the store.
    pub fn next_epoch(&self) -> u64 {
        let latest = self.store.latest_epoch();
        if self.store.contains(latest) {
            latest + 1
        } else {
            0
        }
    }

    /// Process every epoch `source` has beyond the store's latest.
    /// Returns the number of epochs processed.
    pub async fn catch_up(&self, source: &dyn EpochSource) -> Result<u64, MonitorError> {
        let mut processed = 0;
        loop {
            let epoch = self.next_epoch();
            let first_tree_size = self
                .trusted
                .lock()
                .await
                .log_root
                .as_ref()
                .map(|root| root.tree_size)
                .unwrap_or(0);

            let response = source
                .get_epoch(epoch, first_tree_size)
                .await
                .map_err(|source| MonitorError::Source { epoch, source })?;
            let Some(response) = response else {
                return Ok(processed);
            };
            self.process(response).await?;
            processed += 1;
        }
    }
}
