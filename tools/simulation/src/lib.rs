//! Key transparency simulation
//!
//! In-process reference backends plus a harness that runs the epoch
//! sequencer and the monitor against them, with seeded workloads and
//! injected faults.
//!
//! # Modules
//! - `backends`: In-memory log, map, mutation queue and witness
//! - `server`: Key server read path serving monitor responses
//! - `workload`: Seeded mutation traffic
//! - `scenario`: Scripted and live end-to-end runs
//! - `config`: TOML configuration for the `kt-sim` binary

pub mod backends;
pub mod config;
pub mod scenario;
pub mod server;
pub mod workload;

pub use config::SimConfig;
pub use scenario::{ScenarioReport, Simulation, SimulationError};

/// Crate version constant
pub const VERSION: &str = "1.0.0";
