//! Result Store
//!
//! One [`MonitoringResult`] per epoch. A `set` for an epoch that is
//! already present fails with [`StoreError::AlreadyStored`] and leaves the
//! stored result untouched.

pub mod file;
pub mod memory;

use types::monitoring::{MonitorSignedRoot, MonitoringResult, VerificationError};
use types::response::MutationsResponse;

use crate::error::StoreError;

pub use file::FileResultStore;
pub use memory::MemoryResultStore;

/// Keyed store of monitoring results.
///
/// Implementations are internally synchronized; concurrent `set` calls for
/// different epochs are independent.
pub trait ResultStore: Send + Sync {
    fn set(
        &self,
        epoch: u64,
        seen_nanos: i64,
        signed_root: Option<MonitorSignedRoot>,
        response: Option<MutationsResponse>,
        errors: Vec<VerificationError>,
    ) -> Result<(), StoreError>;

    fn get(&self, epoch: u64) -> Result<MonitoringResult, StoreError>;

    /// Highest stored epoch, 0 when the store is empty.
    fn latest_epoch(&self) -> u64;

    fn contains(&self, epoch: u64) -> bool {
        self.get(epoch).is_ok()
    }

    /// Newest result that passed verification, walking back from the
    /// latest epoch.
    fn latest_verified(&self) -> Option<MonitoringResult> {
        (0..=self.latest_epoch())
            .rev()
            .filter_map(|epoch| self.get(epoch).ok())
            .find(MonitoringResult::is_verified)
    }
}
