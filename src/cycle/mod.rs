//! Day cycle: the ingestion worker and the day-boundary trigger.
//!
//! The worker is either `Running` (applying events) or `Rolling` (folding the day
//! into the summaries). The scheduler never touches counters; it only raises a
//! [`RolloverSignal`] that the worker checks between events.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub mod scheduler;
pub mod worker;

pub use scheduler::{DayTrigger, spawn_scheduler_thread};
pub use worker::{IngestionWorker, RolloverError, RolloverOutcome, spawn_ingestion_thread};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Running,
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloverReason {
    Scheduled,
    EndOfStream,
    /// A failed rollover retried ahead of the first event of a later day.
    Retry,
}

/// Single-slot day-boundary flag; raising it twice before it is taken counts once.
#[derive(Debug, Clone, Default)]
pub struct RolloverSignal {
    raised: Arc<AtomicBool>,
}

impl RolloverSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Clears the flag and reports whether it was set.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }
}

pub(crate) fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let step = Duration::from_millis(100).min(remaining);
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(step);
        slept += step;
    }
}
