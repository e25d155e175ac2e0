//! End-to-end simulation
//!
//! Wires a sequencer and a monitor to the in-memory backends and drives
//! them either through a scripted sequence of rounds ([`Simulation::run`])
//! or with the sequencer's own timing loop ([`Simulation::run_live`]).
//!
//! ```text
//!  Workload ─► InMemoryQueue ─► Sequencer ─► InMemoryMap ─► InMemoryLog
//!                                   │                           │
//!                                   ▼                           ▼
//!                           InMemoryWitness ◄── Monitor ◄── KeyServer
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{info, warn};

use merkle::error::SigningError;
use merkle::signing::RootSigner;
use monitor::crosscheck::{CrossCheckOutcome, CrossCheckReport, CrossChecker};
use monitor::{Monitor, MonitorError, StoreError, Verifier};
use sequencer::backend::Backends;
use sequencer::metrics::SequencerMetrics;
use sequencer::mutator::{EntryMutator, Mutator};
use sequencer::timing::Clock;
use sequencer::witness::{WitnessFailure, WitnessPublisher};
use sequencer::{EpochOutcome, Sequencer, SequencerError};

use crate::backends::{InMemoryLog, InMemoryMap, InMemoryQueue, InMemoryWitness};
use crate::config::{ScenarioConfig, SimConfig};
use crate::server::KeyServer;
use crate::workload::{BatchStats, Workload};

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("sequencer: {0}")]
    Sequencer(#[from] SequencerError),

    #[error("monitor: {0}")]
    Monitor(#[from] MonitorError),

    #[error("result store: {0}")]
    Store(#[from] StoreError),

    #[error("backend key: {0}")]
    Key(#[from] SigningError),

    #[error("sequencer task panicked")]
    SequencerTask(#[from] tokio::task::JoinError),
}

/// Tally of advisory witness cross-checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossCheckTally {
    pub matched: u64,
    pub mismatched: u64,
    pub not_published: u64,
    pub unavailable: u64,
}

impl CrossCheckTally {
    fn record(&mut self, report: &CrossCheckReport) {
        match report.outcome {
            CrossCheckOutcome::Match => self.matched += 1,
            CrossCheckOutcome::Mismatch { .. } => self.mismatched += 1,
            CrossCheckOutcome::NotPublished => self.not_published += 1,
            CrossCheckOutcome::Unavailable => self.unavailable += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.matched + self.mismatched + self.not_published + self.unavailable
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: u64,
    pub root_hash: String,
    pub high_water_mark: u64,
    pub verified: bool,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub version: String,
    pub seed: u64,
    pub rounds: u32,
    pub initialized: bool,
    pub epochs_created: u64,
    pub epochs_skipped: u64,
    pub cycle_failures: u64,
    pub mutations_rejected: u64,
    pub enqueued: BatchStats,
    pub epochs_verified: u64,
    pub epochs_failed: u64,
    pub final_revision: u64,
    pub final_high_water_mark: u64,
    pub final_root_hash: String,
    pub witness_failures: u64,
    pub cross_checks: CrossCheckTally,
    pub epochs: Vec<EpochSummary>,
    pub metrics: BTreeMap<String, u64>,
}

impl ScenarioReport {
    pub fn all_verified(&self) -> bool {
        self.epochs_failed == 0
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Tally {
    initialized: bool,
    created: u64,
    skipped: u64,
    failures: u64,
    rejected: u64,
    enqueued: BatchStats,
}

/// A sequencer, a monitor and the backends between them.
pub struct Simulation {
    config: SimConfig,
    pub map: Arc<InMemoryMap>,
    pub log: Arc<InMemoryLog>,
    pub queue: InMemoryQueue,
    pub witness: Arc<InMemoryWitness>,
    pub server: KeyServer,
    pub sequencer: Arc<Sequencer>,
    pub monitor: Monitor,
    metrics: Arc<SequencerMetrics>,
    workload: Workload,
    witness_failures: mpsc::Receiver<WitnessFailure>,
    cross_checks: mpsc::Receiver<CrossCheckReport>,
    checks: CrossCheckTally,
    witness_failed: u64,
}

/// Backend and monitor signing keys derived from one seed.
fn derive_signers(seed: u64) -> (RootSigner, RootSigner, RootSigner) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let log = RootSigner::from_seed(rng.gen());
    let map = RootSigner::from_seed(rng.gen());
    let monitor = RootSigner::from_seed(rng.gen());
    (log, map, monitor)
}

impl Simulation {
    /// Build every component. Backend keys missing from `config` are taken
    /// from the simulated backends.
    pub fn build(mut config: SimConfig, clock: Arc<dyn Clock>) -> Result<Self, SimulationError> {
        let seed = config.scenario.seed;
        let (log_signer, map_signer, monitor_signer) = derive_signers(seed);

        let map = Arc::new(InMemoryMap::new(config.sequencer.map_id, map_signer, clock.clone()));
        let log = Arc::new(InMemoryLog::new(config.sequencer.log_id, log_signer, clock.clone()));
        let queue = InMemoryQueue::new();
        let witness = Arc::new(InMemoryWitness::new());

        config
            .sequencer
            .map_public_key
            .get_or_insert_with(|| map.verifying_key_hex());
        config
            .monitor
            .map_public_key
            .get_or_insert_with(|| map.verifying_key_hex());
        config
            .monitor
            .log_public_key
            .get_or_insert_with(|| log.verifying_key_hex());

        let metrics = Arc::new(SequencerMetrics::new());
        let mutator: Arc<dyn Mutator> = Arc::new(EntryMutator::new());

        let backends = Backends {
            log: log.clone(),
            map: map.clone(),
            queue: Arc::new(queue.clone()),
        };
        let (publisher, witness_failures) =
            WitnessPublisher::new(witness.clone(), config.sequencer.witness_timeout());
        let sequencer = Sequencer::new(config.sequencer.clone(), backends, mutator.clone(), metrics.clone())?
            .with_witness(publisher);

        let (log_key, map_key) = config.monitor.verifying_keys()?;
        let store = config.monitor.store.open()?;
        let (checker, cross_checks) = CrossChecker::new(witness.clone(), config.monitor.witness_timeout());
        let monitor = Monitor::new(
            config.monitor.map_id,
            Verifier::new(log_key, map_key, mutator),
            monitor_signer,
            store,
            metrics.clone(),
            clock,
        )
        .with_cross_check(checker);

        let server = KeyServer::new(map.clone(), log.clone(), queue.clone());
        let workload = Workload::new(config.workload.clone(), seed);

        Ok(Self {
            config,
            map,
            log,
            queue,
            witness,
            server,
            sequencer: Arc::new(sequencer),
            monitor,
            metrics,
            workload,
            witness_failures,
            cross_checks,
            checks: CrossCheckTally::default(),
            witness_failed: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Run the scripted rounds and report.
    pub async fn run(&mut self) -> Result<ScenarioReport, SimulationError> {
        let scenario = self.config.scenario.clone();
        let mut tally = Tally {
            initialized: self.sequencer.initialize().await?,
            ..Default::default()
        };
        self.monitor.catch_up(&self.server).await?;

        for round in 1..=scenario.rounds {
            if !ScenarioConfig::hits(scenario.idle_every, round) {
                tally.enqueued += self
                    .workload
                    .enqueue_batch(scenario.batch_size, &self.queue, &self.map);
            }
            if ScenarioConfig::hits(scenario.queue_fault_every, round) {
                self.queue.fail_reads(1);
            }
            if ScenarioConfig::hits(scenario.map_fault_every, round) {
                self.map.write_faults.arm(1);
            }
            if ScenarioConfig::hits(scenario.witness_fault_every, round) {
                self.witness.put_faults.arm(1);
            }

            let force = ScenarioConfig::hits(scenario.force_every, round);
            match self.sequencer.create_epoch(force).await {
                Ok(EpochOutcome::Created(epoch)) => {
                    tally.created += 1;
                    tally.rejected += epoch.rejected as u64;
                    if ScenarioConfig::hits(scenario.tamper_every, tally.created as u32) {
                        warn!(epoch = epoch.revision, how = ?scenario.tamper_with, "Serving doctored response");
                        self.server.tamper(epoch.revision, scenario.tamper_with);
                    }
                }
                Ok(EpochOutcome::Skipped) => tally.skipped += 1,
                Err(e) => {
                    warn!(round, error = %e, "Epoch creation failed");
                    tally.failures += 1;
                }
            }

            // Let the witness publish before the monitor cross-checks.
            tokio::task::yield_now().await;
            self.monitor.catch_up(&self.server).await?;
            self.collect_advisories();
        }

        let report = self.report(tally).await?;
        info!(
            created = report.epochs_created,
            verified = report.epochs_verified,
            failed = report.epochs_failed,
            root = %report.final_root_hash,
            "Scenario finished"
        );
        Ok(report)
    }

    /// Run the sequencer's timing loop against a background workload for
    /// the configured duration, polling the monitor as it goes.
    pub async fn run_live(mut self, clock: Arc<dyn Clock>) -> Result<ScenarioReport, SimulationError> {
        let live = self.config.live.clone();
        let batch_size = self.config.scenario.batch_size;

        let (stop, stopped) = watch::channel(false);
        let sequencer = tokio::spawn(self.sequencer.clone().run(clock, stopped));

        let mut enqueue = interval(Duration::from_millis(live.enqueue_every_ms.max(1)));
        enqueue.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll = interval(Duration::from_millis(live.poll_every_ms.max(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let end = sleep(Duration::from_millis(live.duration_ms));
        tokio::pin!(end);

        let mut tally = Tally::default();
        loop {
            tokio::select! {
                _ = &mut end => break,
                _ = enqueue.tick() => {
                    tally.enqueued += self.workload.enqueue_batch(batch_size, &self.queue, &self.map);
                }
                _ = poll.tick() => {
                    if let Err(e) = self.monitor.catch_up(&self.server).await {
                        warn!(error = %e, "Monitor poll failed");
                    }
                    self.collect_advisories();
                }
            }
        }

        let _ = stop.send(true);
        sequencer.await?;
        self.monitor.catch_up(&self.server).await?;

        tally.initialized = self.log.size() > 0;
        tally.created = self.map.latest_revision();
        self.report(tally).await
    }

    /// Take whatever cross-check reports and witness failures have arrived.
    fn collect_advisories(&mut self) {
        while let Ok(report) = self.cross_checks.try_recv() {
            self.checks.record(&report);
        }
        while let Ok(failure) = self.witness_failures.try_recv() {
            warn!(key = %failure.key, error = %failure.error, "Witness publish failed");
            self.witness_failed += 1;
        }
    }

    /// Wait for outstanding cross-checks, up to twice their deadline each.
    async fn drain_advisories(&mut self, expected: u64) {
        let wait = self.config.monitor.witness_timeout() * 2;
        while self.checks.total() < expected {
            match timeout(wait, self.cross_checks.recv()).await {
                Ok(Some(report)) => self.checks.record(&report),
                _ => break,
            }
        }
        self.collect_advisories();
    }

    async fn report(&mut self, tally: Tally) -> Result<ScenarioReport, SimulationError> {
        let store = self.monitor.store().clone();
        let mut epochs = Vec::new();
        let (mut verified, mut failed) = (0, 0);
        if store.contains(store.latest_epoch()) {
            for epoch in 0..=store.latest_epoch() {
                let result = store.get(epoch)?;
                let root = self.map.root_at(epoch);
                if result.is_verified() {
                    verified += 1;
                } else {
                    failed += 1;
                }
                epochs.push(EpochSummary {
                    epoch,
                    root_hash: root.as_ref().map(|r| r.root_hash_hex()).unwrap_or_default(),
                    high_water_mark: root.as_ref().map(|r| r.high_water_mark()).unwrap_or(0),
                    verified: result.is_verified(),
                    failures: result.errors.iter().map(ToString::to_string).collect(),
                });
            }
        }

        self.drain_advisories(verified + failed).await;
        let head = self.map.root_at(self.map.latest_revision());

        Ok(ScenarioReport {
            version: crate::VERSION.to_string(),
            seed: self.config.scenario.seed,
            rounds: self.config.scenario.rounds,
            initialized: tally.initialized,
            epochs_created: tally.created,
            epochs_skipped: tally.skipped,
            cycle_failures: tally.failures,
            mutations_rejected: tally.rejected,
            enqueued: tally.enqueued,
            epochs_verified: verified,
            epochs_failed: failed,
            final_revision: self.map.latest_revision(),
            final_high_water_mark: head.as_ref().map(|r| r.high_water_mark()).unwrap_or(0),
            final_root_hash: head.as_ref().map(|r| r.root_hash_hex()).unwrap_or_default(),
            witness_failures: self.witness_failed,
            cross_checks: self.checks,
            epochs,
            metrics: self.metrics.export(),
        })
    }
}
