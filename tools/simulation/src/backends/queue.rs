//! In-memory mutation queue
//!
//! Sequence numbers start at 1 and are assigned on enqueue. Mutations are
//! never removed: the sequencer reads past its high-water mark and the key
//! server replays old ranges when building responses.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use sequencer::backend::{MutationQueue, ReadTransaction};
use types::errors::BackendError;
use types::mutation::Mutation;

use super::FaultSwitch;

#[derive(Default)]
struct QueueState {
    mutations: Vec<Mutation>,
}

#[derive(Default)]
struct Faults {
    reads: FaultSwitch,
    commits: FaultSwitch,
}

#[derive(Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<QueueState>>,
    faults: Arc<Faults>,
    stats: Arc<Mutex<TxnStats>>,
}

/// Transaction outcomes, for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnStats {
    pub committed: u64,
    pub rolled_back: u64,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a mutation and return its sequence number.
    pub fn enqueue(&self, key: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> u64 {
        let mut state = self.lock();
        let sequence = state.mutations.len() as u64 + 1;
        state.mutations.push(Mutation::new(sequence, key, payload));
        sequence
    }

    pub fn len(&self) -> usize {
        self.lock().mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutations with `low < sequence <= high`, in order.
    pub fn range(&self, low: u64, high: u64) -> Vec<Mutation> {
        self.lock()
            .mutations
            .iter()
            .filter(|m| m.sequence > low && m.sequence <= high)
            .cloned()
            .collect()
    }

    /// Fail the next `n` reads.
    pub fn fail_reads(&self, n: u32) {
        self.faults.reads.arm(n);
    }

    /// Fail the next `n` commits.
    pub fn fail_commits(&self, n: u32) {
        self.faults.commits.arm(n);
    }

    pub fn stats(&self) -> TxnStats {
        *self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MutationQueue for InMemoryQueue {
    async fn begin_read(&self) -> Result<Box<dyn ReadTransaction>, BackendError> {
        Ok(Box::new(InMemoryTxn {
            queue: self.clone(),
        }))
    }
}

struct InMemoryTxn {
    queue: InMemoryQueue,
}

#[async_trait]
impl ReadTransaction for InMemoryTxn {
    async fn read_all_since(&mut self, sequence: u64) -> Result<(u64, Vec<Mutation>), BackendError> {
        if self.queue.faults.reads.trip() {
            return Err(BackendError::Unavailable("queue read failed".to_string()));
        }
        let mutations: Vec<Mutation> = self
            .queue
            .lock()
            .mutations
            .iter()
            .filter(|m| m.sequence > sequence)
            .cloned()
            .collect();
        let max = mutations.last().map(|m| m.sequence).unwrap_or(sequence);
        Ok((max, mutations))
    }

    async fn commit(self: Box<Self>) -> Result<(), BackendError> {
        if self.queue.faults.commits.trip() {
            return Err(BackendError::Unavailable("queue commit failed".to_string()));
        }
        self.queue
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .committed += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BackendError> {
        self.queue
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .rolled_back += 1;
        Ok(())
    }
}
