//! Mutation workload generator
//!
//! Deterministic client traffic for the mutation queue. Most mutations are
//! well-formed chained updates built against the key's current map value;
//! a configurable share is stale, garbled or addressed to an over-long key
//! so the resolver's rejection paths run on every epoch.

use std::ops::AddAssign;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use sequencer::mutator::EntryUpdate;
use types::mutation::{MapIndex, INDEX_LEN};

use crate::backends::{InMemoryMap, InMemoryQueue};

/// Shape of the generated traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Distinct user keys to update.
    pub keys: u32,
    /// Share of mutations that are stale or garbled.
    pub invalid_ratio: f64,
    /// Share of mutations addressed to a key longer than a map index.
    pub long_key_ratio: f64,
    /// Upper bound on generated entry data.
    pub max_data_len: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            keys: 64,
            invalid_ratio: 0.1,
            long_key_ratio: 0.02,
            max_data_len: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Chains onto the key's current value.
    Valid,
    /// Claims the key is unset.
    Stale,
    /// Payload that does not decode.
    Garbage,
    /// Key that cannot be canonicalized.
    LongKey,
}

/// Counts of what one batch enqueued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub valid: u64,
    pub stale: u64,
    pub garbage: u64,
    pub long_key: u64,
}

impl AddAssign for BatchStats {
    fn add_assign(&mut self, other: Self) {
        self.valid += other.valid;
        self.stale += other.stale;
        self.garbage += other.garbage;
        self.long_key += other.long_key;
    }
}

impl BatchStats {
    pub fn total(&self) -> u64 {
        self.valid + self.stale + self.garbage + self.long_key
    }

    fn count(&mut self, kind: MutationKind) {
        match kind {
            MutationKind::Valid => self.valid += 1,
            MutationKind::Stale => self.stale += 1,
            MutationKind::Garbage => self.garbage += 1,
            MutationKind::LongKey => self.long_key += 1,
        }
    }
}

pub struct Workload {
    config: WorkloadConfig,
    rng: ChaCha8Rng,
}

impl Workload {
    pub fn new(config: WorkloadConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn user_key(n: u32) -> Vec<u8> {
        format!("user-{n:06}").into_bytes()
    }

    fn pick_kind(&mut self) -> MutationKind {
        let roll: f64 = self.rng.gen();
        if roll < self.config.long_key_ratio {
            MutationKind::LongKey
        } else if roll < self.config.long_key_ratio + self.config.invalid_ratio {
            if self.rng.gen_bool(0.5) {
                MutationKind::Stale
            } else {
                MutationKind::Garbage
            }
        } else {
            MutationKind::Valid
        }
    }

    fn data(&mut self) -> Vec<u8> {
        let len = self.rng.gen_range(1..=self.config.max_data_len.max(1));
        (0..len).map(|_| self.rng.gen()).collect()
    }

    /// One `(kind, key, payload)`. `current` looks up a key's leaf value.
    pub fn next_mutation<F>(&mut self, current: F) -> (MutationKind, Vec<u8>, Vec<u8>)
    where
        F: Fn(&MapIndex) -> Option<Vec<u8>>,
    {
        let kind = self.pick_kind();
        let key = if kind == MutationKind::LongKey {
            vec![b'x'; INDEX_LEN + self.rng.gen_range(1..=8)]
        } else {
            Self::user_key(self.rng.gen_range(0..self.config.keys.max(1)))
        };
        let data = self.data();

        let payload = match kind {
            MutationKind::Garbage => {
                let mut bytes = data;
                bytes.insert(0, 0xFF);
                bytes
            }
            MutationKind::Stale | MutationKind::LongKey => {
                EntryUpdate::chained(None, data)
                    .and_then(|u| u.encode())
                    .unwrap_or_default()
            }
            MutationKind::Valid => {
                let existing = MapIndex::from_key(&key).ok().and_then(|index| current(&index));
                match EntryUpdate::chained(existing.as_deref(), data).and_then(|u| u.encode()) {
                    Ok(payload) => payload,
                    // Leaf holds something other than an entry; nothing can chain onto it.
                    Err(_) => Vec::new(),
                }
            }
        };
        (kind, key, payload)
    }

    /// Enqueue `size` mutations built against the map's latest revision.
    ///
    /// Two valid updates to the same key in one batch both chain onto the
    /// same value, so the later one is rejected by the resolver.
    pub fn enqueue_batch(&mut self, size: usize, queue: &InMemoryQueue, map: &InMemoryMap) -> BatchStats {
        let mut stats = BatchStats::default();
        for _ in 0..size {
            let (kind, key, payload) = self.next_mutation(|index| map.value(index));
            queue.enqueue(key, payload);
            stats.count(kind);
        }
        stats
    }
}
