//! Epoch sequencer
//!
//! One `create_epoch` call runs one full cycle:
//!
//! ```text
//! GetSignedMapRoot ─► ReadAll(since hwm) ─► GetLeaves ─► resolve
//!        ─► SetLeaves(hwm') ─► QueueLeaf(anchor) ─► witness (async)
//! ```
//!
//! Cycles are serialized by an internal lock, so at most one runs per
//! sequencer. Every RPC of a cycle shares one deadline of `min_interval`
//! from the start of the cycle. The map write is the only state-changing
//! step before anchoring; a failure before it leaves no trace, a failure
//! after it is an [`SequencerError::AnchorFailure`].

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use tokio::sync::{watch, Mutex};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use merkle::anchor::anchor_leaf;
use merkle::map::verify_map_inclusion;
use merkle::signing::{verify_map_root, verifying_key_from_hex};
use types::errors::BackendError;
use types::ids::WitnessKey;
use types::map::{MapLeaf, MapperMetadata, SignedMapRoot};
use types::mutation::{MapIndex, Mutation};

use crate::backend::Backends;
use crate::config::SequencerConfig;
use crate::error::SequencerError;
use crate::metrics::{self, MetricsSink};
use crate::mutator::Mutator;
use crate::resolver::apply_mutations;
use crate::timing::{spawn_epoch_ticks, Clock, EpochTimer};
use crate::witness::WitnessPublisher;

/// A created epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    pub revision: u64,
    pub high_water_mark: u64,
    pub root: SignedMapRoot,
    /// Mutations read for this epoch.
    pub mutations: usize,
    /// Distinct indexes written.
    pub unique: usize,
    pub rejected: usize,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpochOutcome {
    /// Nothing pending and not forced; no map write happened.
    Skipped,
    Created(Epoch),
}

pub struct Sequencer {
    config: SequencerConfig,
    backends: Backends,
    mutator: Arc<dyn Mutator>,
    metrics: Arc<dyn MetricsSink>,
    witness: Option<WitnessPublisher>,
    map_key: Option<VerifyingKey>,
    cycle: Mutex<()>,
}

impl Sequencer {
    pub fn new(
        config: SequencerConfig,
        backends: Backends,
        mutator: Arc<dyn Mutator>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, SequencerError> {
        config.validate()?;
        let map_key = config
            .map_public_key
            .as_deref()
            .map(verifying_key_from_hex)
            .transpose()
            .map_err(|e| SequencerError::Config(format!("map_public_key: {e}")))?;

        info!(
            map_id = %config.map_id,
            log_id = %config.log_id,
            min_interval_ms = config.min_interval_ms,
            max_interval_ms = config.max_interval_ms,
            trust_backend = config.trust_backend,
            "Sequencer initialized"
        );

        Ok(Self {
            config,
            backends,
            mutator,
            metrics,
            witness: None,
            map_key,
            cycle: Mutex::new(()),
        })
    }

    pub fn with_witness(mut self, publisher: WitnessPublisher) -> Self {
        self.witness = Some(publisher);
        self
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.min_interval()
    }

    async fn call<T, F>(
        &self,
        deadline: Instant,
        rpc: &'static str,
        id: impl ToString,
        fut: F,
    ) -> Result<T, SequencerError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match timeout_at(deadline, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SequencerError::backend(rpc, id, e)),
            Err(_) => Err(SequencerError::DeadlineExceeded { rpc }),
        }
    }

    // ── Bootstrap ────────────────────────────────────────────────────

    /// Anchor the genesis map root if both trees are still empty. Returns
    /// whether a leaf was queued.
    pub async fn initialize(&self) -> Result<bool, SequencerError> {
        let _cycle = self.cycle.lock().await;
        let deadline = self.deadline();
        let log_id = self.config.log_id;
        let map_id = self.config.map_id;

        let log_root = self
            .call(deadline, "GetLatestSignedLogRoot", log_id, self.backends.log.latest_root(log_id))
            .await?;
        let map_root = self
            .call(deadline, "GetSignedMapRoot", map_id, self.backends.map.get_root(map_id))
            .await?;

        if log_root.tree_size == 0 && map_root.revision == 0 {
            info!(log_id = %log_id, map_id = %map_id, "Initializing log with genesis map root");
            self.anchor(deadline, &map_root).await?;
            return Ok(true);
        }
        Ok(false)
    }

    // ── Epoch creation ───────────────────────────────────────────────

    /// Run one epoch-creation cycle.
    pub async fn create_epoch(&self, force: bool) -> Result<EpochOutcome, SequencerError> {
        let _cycle = self.cycle.lock().await;
        let started = std::time::Instant::now();
        let deadline = self.deadline();
        let map_id = self.config.map_id;

        debug!(force, "CreateEpoch: starting sequencing run");

        let head = self
            .call(deadline, "GetSignedMapRoot", map_id, self.backends.map.get_root(map_id))
            .await?;
        self.check_head(&head)?;
        let previous_hwm = head.high_water_mark();
        debug!(
            revision = head.revision,
            high_water_mark = previous_hwm,
            "CreateEpoch: previous map root"
        );

        let (max_sequence, mutations) = self.read_mutations(deadline, previous_hwm).await?;

        if mutations.is_empty() && !force {
            info!(revision = head.revision, "CreateEpoch: no mutations found, skipping");
            return Ok(EpochOutcome::Skipped);
        }

        let indexes: Vec<MapIndex> = mutations
            .iter()
            .filter_map(|m| m.index().ok())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let current = if indexes.is_empty() {
            Vec::new()
        } else {
            self.current_leaves(deadline, &head, &indexes).await?
        };

        let batch = apply_mutations(self.mutator.as_ref(), &mutations, &current);
        let unique = batch.unique();
        let rejected = batch.rejected.len();
        debug!(
            mutations = mutations.len(),
            unique,
            rejected,
            "CreateEpoch: applied mutations"
        );

        let high_water_mark = previous_hwm.max(max_sequence);
        let map_write = std::time::Instant::now();
        let root = self
            .call(
                deadline,
                "SetLeaves",
                map_id,
                self.backends.map.set_leaves(
                    map_id,
                    batch.leaves,
                    MapperMetadata { high_water_mark },
                ),
            )
            .await?;
        let map_elapsed = map_write.elapsed();
        debug!(revision = root.revision, high_water_mark, "CreateEpoch: SetLeaves done");

        self.anchor(deadline, &root).await?;

        if let Some(witness) = &self.witness {
            witness.publish(WitnessKey::new(map_id, root.revision), root.root_hash.to_vec());
        }

        self.metrics.add(metrics::MUTATIONS, mutations.len() as u64);
        self.metrics.add(metrics::MUTATIONS_UNIQUE, unique as u64);
        self.metrics.observe(metrics::MAP_UPDATE_SECONDS, map_elapsed);
        self.metrics.observe(metrics::CREATE_EPOCH_SECONDS, started.elapsed());

        info!(
            revision = root.revision,
            high_water_mark,
            root = %root.root_hash_hex(),
            mutations = mutations.len(),
            unique,
            "Created epoch"
        );

        Ok(EpochOutcome::Created(Epoch {
            revision: root.revision,
            high_water_mark,
            root,
            mutations: mutations.len(),
            unique,
            rejected,
        }))
    }

    fn check_head(&self, head: &SignedMapRoot) -> Result<(), SequencerError> {
        if self.config.trust_backend {
            return Ok(());
        }
        let key = self
            .map_key
            .as_ref()
            .ok_or_else(|| SequencerError::Config("untrusted mode without map key".into()))?;
        verify_map_root(key, head).map_err(|_| SequencerError::UntrustedMapRoot {
            revision: head.revision,
        })
    }

    async fn read_mutations(
        &self,
        deadline: Instant,
        since: u64,
    ) -> Result<(u64, Vec<Mutation>), SequencerError> {
        let mut txn = self
            .call(deadline, "NewReadTransaction", since, self.backends.queue.begin_read())
            .await?;

        let read = self
            .call(deadline, "ReadAll", since, txn.read_all_since(since))
            .await;

        match read {
            Ok(batch) => {
                self.call(deadline, "Commit", since, txn.commit()).await?;
                Ok(batch)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    error!(error = %rollback, "Cannot roll back mutation read transaction");
                }
                Err(e)
            }
        }
    }

    async fn current_leaves(
        &self,
        deadline: Instant,
        head: &SignedMapRoot,
        indexes: &[MapIndex],
    ) -> Result<Vec<MapLeaf>, SequencerError> {
        let map_id = self.config.map_id;
        let revision = if self.config.trust_backend {
            None
        } else {
            Some(head.revision)
        };
        let inclusions = self
            .call(
                deadline,
                "GetLeaves",
                map_id,
                self.backends.map.get_leaves(map_id, indexes, revision),
            )
            .await?;

        if self.config.trust_backend {
            return Ok(inclusions.iter().filter_map(|i| i.leaf()).collect());
        }

        let mut leaves = Vec::with_capacity(indexes.len());
        for index in indexes {
            let inclusion = inclusions
                .iter()
                .find(|i| i.index == *index)
                .ok_or(SequencerError::UntrustedLeaf { index: *index })?;
            verify_map_inclusion(
                &head.root_hash,
                index,
                inclusion.value.as_deref(),
                &inclusion.inclusion,
            )
            .map_err(|_| SequencerError::UntrustedLeaf { index: *index })?;
            leaves.extend(inclusion.leaf());
        }
        Ok(leaves)
    }

    async fn anchor(&self, deadline: Instant, root: &SignedMapRoot) -> Result<(), SequencerError> {
        let log_id = self.config.log_id;
        let leaf = anchor_leaf(root)?;
        match timeout_at(deadline, self.backends.log.queue_leaf(log_id, leaf)).await {
            Ok(Ok(())) => Ok(()),
            outcome => {
                let source = match outcome {
                    Ok(Err(e)) => e,
                    _ => BackendError::DeadlineExceeded,
                };
                error!(
                    revision = root.revision,
                    log_id = %log_id,
                    error = %source,
                    "Map revision not anchored in log; operator attention required"
                );
                Err(SequencerError::AnchorFailure {
                    revision: root.revision,
                    source,
                })
            }
        }
    }

    // ── Timing loop ──────────────────────────────────────────────────

    /// Timestamp to seed the timing controller with. If the head cannot be
    /// read, force an epoch and read it again.
    async fn startup_last(&self, clock: &dyn Clock) -> DateTime<Utc> {
        let map_id = self.config.map_id;
        let head = self
            .call(self.deadline(), "GetSignedMapRoot", map_id, self.backends.map.get_root(map_id))
            .await;
        match head {
            Ok(head) => return head.timestamp(),
            Err(e) => warn!(error = %e, "Cannot read map head at startup, forcing epoch"),
        }

        if let Err(e) = self.create_epoch(true).await {
            error!(error = %e, "CreateEpoch failed");
        }
        match self
            .call(self.deadline(), "GetSignedMapRoot", map_id, self.backends.map.get_root(map_id))
            .await
        {
            Ok(head) => head.timestamp(),
            Err(e) => {
                error!(error = %e, "GetSignedMapRoot failed after CreateEpoch");
                clock.now()
            }
        }
    }

    /// Initialize, then create epochs on timer decisions until `shutdown`
    /// flips or its sender is dropped. Cycle failures are logged and the
    /// loop moves on to the next tick.
    pub async fn run(self: Arc<Self>, clock: Arc<dyn Clock>, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.initialize().await {
            error!(error = %e, "Initialize failed");
        }

        let last = self.startup_last(clock.as_ref()).await;
        let timer = EpochTimer::new(last, self.config.min_interval(), self.config.max_interval());
        let (ticker, mut decisions) = spawn_epoch_ticks(clock, timer);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                decision = decisions.recv() => {
                    let Some(force) = decision else { break };
                    if let Err(e) = self.create_epoch(force).await {
                        error!(error = %e, force, "CreateEpoch failed");
                    }
                }
            }
        }

        ticker.abort();
        info!(map_id = %self.config.map_id, "Sequencer stopped");
    }
}
