//! In-memory reference backends
//!
//! Single-process stand-ins for the log, map, mutation queue and witness
//! services. They keep every revision so the key server can serve proofs
//! for any epoch, and expose fault switches for failure scenarios.

pub mod log;
pub mod map;
pub mod queue;
pub mod witness;

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use sequencer::timing::Clock;

pub use self::log::InMemoryLog;
pub use self::map::InMemoryMap;
pub use self::queue::InMemoryQueue;
pub use self::witness::InMemoryWitness;

/// Counts down injected failures.
#[derive(Debug, Default)]
pub struct FaultSwitch(AtomicU32);

impl FaultSwitch {
    /// Fail the next `n` calls.
    pub fn arm(&self, n: u32) {
        self.0.store(n, Ordering::SeqCst);
    }

    /// Consume one armed failure, if any.
    pub fn trip(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn armed(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deterministic clock: every reading is one step later than the last.
#[derive(Debug)]
pub struct SteppingClock {
    start_nanos: i64,
    step_nanos: i64,
    ticks: AtomicI64,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Arc<Self> {
        Arc::new(Self {
            start_nanos: start.timestamp_nanos_opt().unwrap_or(0),
            step_nanos: step.num_nanoseconds().unwrap_or(1),
            ticks: AtomicI64::new(0),
        })
    }

    /// 2024-01-01T00:00:00Z, advancing 1ms per reading.
    pub fn fixed() -> Arc<Self> {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start, Duration::milliseconds(1))
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        let nanos = self.start_nanos.saturating_add(tick.saturating_mul(self.step_nanos));
        DateTime::from_timestamp_nanos(nanos)
    }
}
