//! Epoch timing
//!
//! [`EpochTimer`] decides, per tick, whether the next epoch must be forced
//! even if no mutation is pending. [`spawn_epoch_ticks`] drives it from a
//! `minInterval` ticker and hands decisions to the sequencer over a
//! single-slot channel, so at most one decision is ever pending.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that advances with the tokio clock, including paused time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    wall: DateTime<Utc>,
    base: Instant,
}

impl TokioClock {
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            base: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.base.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// Forced-epoch state machine.
#[derive(Debug, Clone)]
pub struct EpochTimer {
    last: DateTime<Utc>,
    min_interval: Duration,
    max_interval: Duration,
}

impl EpochTimer {
    /// `last` is the timestamp of the latest epoch, normally the current
    /// map head's timestamp.
    pub fn new(last: DateTime<Utc>, min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            last,
            min_interval,
            max_interval,
        }
    }

    pub fn last(&self) -> DateTime<Utc> {
        self.last
    }

    /// Force when waiting another `min_interval` would reach `max_interval`.
    pub fn should_force(&mut self, now: DateTime<Utc>) -> bool {
        let elapsed = (now - self.last).to_std().unwrap_or(Duration::ZERO);
        if elapsed + self.min_interval >= self.max_interval {
            self.last = now;
            true
        } else {
            false
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Start the tick task. The first decision is evaluated immediately, then
/// one per `min_interval`. The task ends when the receiver is dropped.
pub fn spawn_epoch_ticks(
    clock: Arc<dyn Clock>,
    mut timer: EpochTimer,
) -> (JoinHandle<()>, mpsc::Receiver<bool>) {
    let (tx, rx) = mpsc::channel(1);

    let handle = tokio::spawn(async move {
        // Resume from the last epoch instead of waiting a full interval.
        let force = timer.should_force(clock.now());
        if force && tx.send(true).await.is_err() {
            return;
        }

        let period = timer.min_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let now = clock.now();
            let force = timer.should_force(now);
            debug!(force, last = %timer.last(), "Epoch tick");
            if tx.send(force).await.is_err() {
                return;
            }
        }
    });

    (handle, rx)
}
