//! Types library for the key transparency sequencer and monitor
//!
//! This library provides the core type definitions shared by the epoch
//! sequencer, the mutation verifier/monitor and the simulation toolkit.
//!
//! # Version
//! v1.0.0 - Frozen wire format
//!
//! # Modules
//! - `ids`: Tree identifiers (MapId, LogId) and the 32-byte hash alias
//! - `mutation`: Queued key/value mutations and canonical map indexes
//! - `map`: Map leaves, inclusion proofs and signed map roots
//! - `log`: Log leaves and signed log roots
//! - `response`: Mutation-batch responses served to external clients
//! - `monitoring`: Monitoring results and verification failures
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod mutation;
pub mod map;
pub mod log;
pub mod response;
pub mod monitoring;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::log::*;
    pub use crate::map::*;
    pub use crate::monitoring::*;
    pub use crate::mutation::*;
    pub use crate::response::*;
}
