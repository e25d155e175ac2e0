//! Key transparency monitor
//!
//! Independently verifies each epoch a key server publishes, countersigns
//! the map roots that pass, and records one monitoring result per epoch.
//!
//! # Architecture
//!
//! ```text
//!  EpochSource ──► Monitor::process ──► Verifier (pure)
//!                        │                  └─ sequencer::resolver re-run
//!                        ├──► ResultStore (memory | file journal)
//!                        └──► CrossChecker (async, advisory)
//! ```

pub mod config;
pub mod crosscheck;
pub mod error;
pub mod monitor;
pub mod storage;
pub mod verifier;

#[cfg(test)]
mod testkit;

pub use config::{MonitorConfig, StoreConfig};
pub use error::{MonitorError, StoreError};
pub use monitor::{EpochSource, Monitor};
pub use storage::{FileResultStore, MemoryResultStore, ResultStore};
pub use verifier::{TrustedState, Verifier};
