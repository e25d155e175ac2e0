//! Simulation configuration
//!
//! One TOML file configures every component. Each section is optional and
//! falls back to its defaults:
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [sequencer]
//! min_interval_ms = 50
//!
//! [monitor.store]
//! kind = "file"
//! path = "/var/lib/kt/monitor.journal"
//!
//! [scenario]
//! seed = 42
//! rounds = 20
//!
//! [workload]
//! keys = 128
//! ```
//!
//! Backend public keys are filled in from the simulated backends' signers
//! when the file leaves them out.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use monitor::MonitorConfig;
use sequencer::SequencerConfig;

use crate::server::Tamper;
use crate::workload::WorkloadConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Parameters of a scripted run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Seeds the workload and the backend signing keys.
    pub seed: u64,
    /// Epoch-creation attempts.
    pub rounds: u32,
    /// Mutations enqueued before each attempt.
    pub batch_size: usize,
    /// Force every n-th attempt even with nothing queued; 0 never forces.
    pub force_every: u32,
    /// Leave every n-th round without new mutations; 0 never idles.
    pub idle_every: u32,
    /// Fail the queue read of every n-th round; 0 disables.
    pub queue_fault_every: u32,
    /// Fail the map write of every n-th round; 0 disables.
    pub map_fault_every: u32,
    /// Fail the witness publish of every n-th round; 0 disables.
    pub witness_fault_every: u32,
    /// Serve a doctored response for every n-th epoch; 0 disables.
    pub tamper_every: u32,
    pub tamper_with: Tamper,
    /// Write the JSON report here.
    pub report_path: Option<PathBuf>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            rounds: 20,
            batch_size: 16,
            force_every: 5,
            idle_every: 4,
            queue_fault_every: 0,
            map_fault_every: 0,
            witness_fault_every: 0,
            tamper_every: 0,
            tamper_with: Tamper::default(),
            report_path: None,
        }
    }
}

impl ScenarioConfig {
    /// Whether round `n` (1-based) hits an `every` cadence.
    pub fn hits(every: u32, round: u32) -> bool {
        every != 0 && round % every == 0
    }
}

/// Duration of a `live` run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub duration_ms: u64,
    /// Gap between workload batches.
    pub enqueue_every_ms: u64,
    /// Gap between monitor polls.
    pub poll_every_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            duration_ms: 10_000,
            enqueue_every_ms: 250,
            poll_every_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub log: LogConfig,
    pub sequencer: SequencerConfig,
    pub monitor: MonitorConfig,
    pub scenario: ScenarioConfig,
    pub workload: WorkloadConfig,
    pub live: LiveConfig,
}

impl SimConfig {
    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        anyhow::ensure!(
            config.sequencer.map_id == config.monitor.map_id,
            "sequencer map_id {} differs from monitor map_id {}",
            config.sequencer.map_id,
            config.monitor.map_id
        );
        Ok(config)
    }
}
