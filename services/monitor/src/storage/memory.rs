//! In-memory result store

use std::collections::BTreeMap;
use std::sync::RwLock;

use types::monitoring::{MonitorSignedRoot, MonitoringResult, VerificationError};
use types::response::MutationsResponse;

use super::ResultStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryResultStore {
    results: RwLock<BTreeMap<u64, MonitoringResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for MemoryResultStore {
    fn set(
        &self,
        epoch: u64,
        seen_nanos: i64,
        signed_root: Option<MonitorSignedRoot>,
        response: Option<MutationsResponse>,
        errors: Vec<VerificationError>,
    ) -> Result<(), StoreError> {
        let mut results = self
            .results
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if results.contains_key(&epoch) {
            return Err(StoreError::AlreadyStored { epoch });
        }
        results.insert(
            epoch,
            MonitoringResult {
                epoch,
                seen_nanos,
                signed_root,
                errors,
                response,
            },
        );
        Ok(())
    }

    fn get(&self, epoch: u64) -> Result<MonitoringResult, StoreError> {
        let results = self
            .results
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        results
            .get(&epoch)
            .cloned()
            .ok_or(StoreError::NotFound { epoch })
    }

    fn latest_epoch(&self) -> u64 {
        let results = self
            .results
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        results.keys().next_back().copied().unwrap_or(0)
    }
}
