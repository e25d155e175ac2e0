//! In-memory witness

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use sequencer::backend::Witness;
use types::errors::BackendError;
use types::ids::WitnessKey;

use super::FaultSwitch;

#[derive(Default)]
pub struct InMemoryWitness {
    hashes: Mutex<BTreeMap<WitnessKey, Vec<u8>>>,
    /// Fail the next `put_root_hash` calls.
    pub put_faults: FaultSwitch,
}

impl InMemoryWitness {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<WitnessKey, Vec<u8>>> {
        self.hashes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overwrite a published hash, simulating a lying witness.
    pub fn tamper(&self, key: WitnessKey, hash: Vec<u8>) {
        self.lock().insert(key, hash);
    }

    pub fn published(&self) -> usize {
        self.lock().len()
    }
}

#[async_trait]
impl Witness for InMemoryWitness {
    async fn get_root_hash(&self, key: &WitnessKey) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn put_root_hash(&self, key: &WitnessKey, hash: Vec<u8>) -> Result<(), BackendError> {
        if self.put_faults.trip() {
            return Err(BackendError::Unavailable("witness rejected write".to_string()));
        }
        self.lock().insert(*key, hash);
        Ok(())
    }
}
