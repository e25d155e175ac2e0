//! Epoch Sequencer
//!
//! Batches pending key/value mutations into epochs, applies them to the
//! verifiable map and anchors each new map root in the append-only log.
//!
//! # Architecture
//!
//! ```text
//!  ticker ──(force?)──► Sequencer::create_epoch
//!   (timing)  cap 1          │
//!                 ┌──────────┼──────────────┐
//!                 ▼          ▼              ▼
//!          MutationQueue   MapBackend    LogBackend
//!           ReadAll        Get/SetLeaves  QueueLeaf
//!                            │
//!                      resolver (pure)
//!                            │
//!                  WitnessPublisher (async, best-effort)
//! ```
//!
//! The mutation-application policy and the resolver are reused by the
//! monitor so both sides derive identical state transitions.

pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod mutator;
pub mod resolver;
pub mod sequencer;
pub mod telemetry;
pub mod timing;
pub mod witness;

pub use config::SequencerConfig;
pub use error::{MutationError, SequencerError};
pub use sequencer::{Epoch, EpochOutcome, Sequencer};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
