//! Live occupancy and queue counters for the current operating day.
//!
//! The counter is owned by the ingestion worker and mutated one event at a time.
//! Readers only ever see published [`Snapshot`] copies.

use crate::estimation::QueueTimeEstimator;
use serde::Serialize;
use time::Time;

pub const DEFAULT_MIN_OCCUPANCY: u32 = 0;
pub const DEFAULT_MAX_OCCUPANCY: u32 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Person entered the cafeteria and joined the queue.
    Entry,
    /// Person left the queue at the register.
    QueueExit,
    /// Person left the cafeteria.
    OccupancyExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: Time,
    pub kind: EventKind,
}

impl Event {
    /// Builds an event at second precision.
    pub fn new(timestamp: Time, kind: EventKind) -> Self {
        Self {
            timestamp: timestamp.replace_nanosecond(0).unwrap_or(timestamp),
            kind,
        }
    }
}

/// Events of the current operating day in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayLog {
    events: Vec<Event>,
}

impl DayLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl FromIterator<Event> for DayLog {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterLimits {
    pub min_occupancy: u32,
    pub max_occupancy: u32,
}

impl Default for CounterLimits {
    fn default() -> Self {
        Self {
            min_occupancy: DEFAULT_MIN_OCCUPANCY,
            max_occupancy: DEFAULT_MAX_OCCUPANCY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterState {
    pub occupancy: u32,
    pub queue_length: u32,
    pub max_occupancy_today: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct Snapshot {
    pub occupancy: u32,
    pub queue_length: u32,
    pub max_occupancy_today: u32,
    pub estimated_queue_time_minutes: f64,
}

#[derive(Debug)]
pub struct OccupancyCounter {
    limits: CounterLimits,
    state: CounterState,
    log: DayLog,
    estimator: Box<dyn QueueTimeEstimator>,
}

impl OccupancyCounter {
    pub fn new(limits: CounterLimits, estimator: Box<dyn QueueTimeEstimator>) -> Self {
        Self {
            limits,
            state: initial_state(limits),
            log: DayLog::new(),
            estimator,
        }
    }

    pub fn limits(&self) -> CounterLimits {
        self.limits
    }

    pub fn state(&self) -> CounterState {
        self.state
    }

    pub fn log(&self) -> &DayLog {
        &self.log
    }

    pub fn estimator(&self) -> &dyn QueueTimeEstimator {
        self.estimator.as_ref()
    }

    /// Applies one event and returns the snapshot to persist.
    ///
    /// Clamped no-ops (entry at max, exits at the floor) are still logged.
    pub fn apply(&mut self, event: Event) -> Snapshot {
        let state = &mut self.state;
        match event.kind {
            EventKind::Entry => {
                state.occupancy = state
                    .occupancy
                    .saturating_add(1)
                    .clamp(self.limits.min_occupancy, self.limits.max_occupancy);
                state.queue_length = state.queue_length.saturating_add(1);
                state.max_occupancy_today = state.max_occupancy_today.max(state.occupancy);
            }
            EventKind::QueueExit => {
                state.queue_length = state.queue_length.saturating_sub(1);
            }
            EventKind::OccupancyExit => {
                state.occupancy = state
                    .occupancy
                    .saturating_sub(1)
                    .max(self.limits.min_occupancy);
            }
        }
        self.log.push(event);
        self.snapshot_at(event.timestamp)
    }

    pub fn snapshot_at(&self, now: Time) -> Snapshot {
        let estimate = self
            .estimator
            .estimate(&self.log, self.state.queue_length, now);
        Snapshot {
            occupancy: self.state.occupancy,
            queue_length: self.state.queue_length,
            max_occupancy_today: self.state.max_occupancy_today,
            estimated_queue_time_minutes: estimate,
        }
    }

    /// Restores the start-of-day state. Only call once the closing day was folded.
    pub fn reset(&mut self) {
        self.state = initial_state(self.limits);
        self.log.clear();
    }
}

fn initial_state(limits: CounterLimits) -> CounterState {
    CounterState {
        occupancy: limits.min_occupancy,
        queue_length: 0,
        max_occupancy_today: limits.min_occupancy,
    }
}
