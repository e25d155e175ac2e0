//! Observability sink for the sequencer and the monitor
//!
//! Components receive a [`MetricsSink`] at construction instead of
//! registering process-wide collectors. [`SequencerMetrics`] is the
//! in-process sink: counters on atomics, histograms as bounded latency
//! windows, exportable as a sorted map.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Total mutations read by the sequencer.
pub const MUTATIONS: &str = "kt_signer_mutations";
/// Unique indexes written per epoch (post-dedupe).
pub const MUTATIONS_UNIQUE: &str = "kt_signer_mutations_unique";
/// Time spent in the map write.
pub const MAP_UPDATE_SECONDS: &str = "kt_signer_map_update_seconds";
/// Time spent in one full epoch creation.
pub const CREATE_EPOCH_SECONDS: &str = "kt_signer_create_epoch_seconds";
/// Monitoring results persisted.
pub const MONITOR_RESULTS_STORED: &str = "kt_monitor_results_stored";
/// Epochs that failed verification.
pub const MONITOR_VERIFICATION_FAILURES: &str = "kt_monitor_verification_failures";

/// Counter and histogram capability.
pub trait MetricsSink: Send + Sync {
    fn add(&self, counter: &'static str, value: u64);

    fn observe(&self, histogram: &'static str, elapsed: Duration);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn add(&self, _counter: &'static str, _value: u64) {}

    fn observe(&self, _histogram: &'static str, _elapsed: Duration) {}
}

/// In-process metrics.
pub struct SequencerMetrics {
    pub mutations: AtomicU64,
    pub mutations_unique: AtomicU64,
    pub results_stored: AtomicU64,
    pub verification_failures: AtomicU64,
    pub map_update_ns: Mutex<LatencyTracker>,
    pub create_epoch_ns: Mutex<LatencyTracker>,
}

impl SequencerMetrics {
    pub fn new() -> Self {
        Self {
            mutations: AtomicU64::new(0),
            mutations_unique: AtomicU64::new(0),
            results_stored: AtomicU64::new(0),
            verification_failures: AtomicU64::new(0),
            map_update_ns: Mutex::new(LatencyTracker::new(1000)),
            create_epoch_ns: Mutex::new(LatencyTracker::new(1000)),
        }
    }

    fn counter(&self, name: &str) -> Option<&AtomicU64> {
        match name {
            MUTATIONS => Some(&self.mutations),
            MUTATIONS_UNIQUE => Some(&self.mutations_unique),
            MONITOR_RESULTS_STORED => Some(&self.results_stored),
            MONITOR_VERIFICATION_FAILURES => Some(&self.verification_failures),
            _ => None,
        }
    }

    fn histogram(&self, name: &str) -> Option<&Mutex<LatencyTracker>> {
        match name {
            MAP_UPDATE_SECONDS => Some(&self.map_update_ns),
            CREATE_EPOCH_SECONDS => Some(&self.create_epoch_ns),
            _ => None,
        }
    }

    /// Export counters plus histogram sample counts and p99 (ns).
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert(MUTATIONS.to_string(), self.mutations.load(Ordering::Relaxed));
        m.insert(MUTATIONS_UNIQUE.to_string(), self.mutations_unique.load(Ordering::Relaxed));
        m.insert(MONITOR_RESULTS_STORED.to_string(), self.results_stored.load(Ordering::Relaxed));
        m.insert(
            MONITOR_VERIFICATION_FAILURES.to_string(),
            self.verification_failures.load(Ordering::Relaxed),
        );
        for (name, tracker) in [
            (MAP_UPDATE_SECONDS, &self.map_update_ns),
            (CREATE_EPOCH_SECONDS, &self.create_epoch_ns),
        ] {
            if let Ok(tracker) = tracker.lock() {
                m.insert(format!("{name}_count"), tracker.count() as u64);
                if let Some(p99) = tracker.percentile(99) {
                    m.insert(format!("{name}_p99_ns"), p99);
                }
            }
        }
        m
    }
}

impl Default for SequencerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for SequencerMetrics {
    fn add(&self, counter: &'static str, value: u64) {
        if let Some(c) = self.counter(counter) {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    fn observe(&self, histogram: &'static str, elapsed: Duration) {
        if let Some(h) = self.histogram(histogram) {
            if let Ok(mut tracker) = h.lock() {
                tracker.record(elapsed.as_nanos().min(u64::MAX as u128) as u64);
            }
        }
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}
