use crate::clock::Clock;
use crate::cycle::{RolloverSignal, sleep_with_stop};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use time::macros::time;
use time::{Date, PrimitiveDateTime, Time, Weekday};
use tracing::{debug, info};

pub const DEFAULT_TRIGGER_TIME: Time = time!(00:00);
pub const DEFAULT_TRIGGER_WEEKDAYS: [Weekday; 5] = [
    Weekday::Monday,
    Weekday::Tuesday,
    Weekday::Wednesday,
    Weekday::Thursday,
    Weekday::Friday,
];
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Once-a-day trigger at a fixed local time on selected weekdays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayTrigger {
    at: Time,
    weekdays: Vec<Weekday>,
}

impl DayTrigger {
    pub fn new(at: Time, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        let mut unique: Vec<Weekday> = Vec::new();
        for weekday in weekdays {
            if !unique.contains(&weekday) {
                unique.push(weekday);
            }
        }
        Self {
            at,
            weekdays: unique,
        }
    }

    pub fn at(&self) -> Time {
        self.at
    }

    pub fn weekdays(&self) -> &[Weekday] {
        &self.weekdays
    }

    pub fn fires_on(&self, weekday: Weekday) -> bool {
        self.weekdays.contains(&weekday)
    }

    /// Whether a trigger instant lies in `(previous, current]`.
    ///
    /// Comparing consecutive samples instead of matching the current minute means
    /// a late wake-up or a clock step over the trigger still fires exactly once.
    pub fn crossed(&self, previous: PrimitiveDateTime, current: PrimitiveDateTime) -> bool {
        if current <= previous || self.weekdays.is_empty() {
            return false;
        }
        // Any gap of a week or more contains every weekday.
        let floor = current.date().saturating_sub(time::Duration::days(7));
        let mut date = previous.date().max(floor);
        loop {
            let candidate = PrimitiveDateTime::new(date, self.at);
            if self.fires_on(date.weekday()) && previous < candidate && candidate <= current {
                return true;
            }
            if date >= current.date() {
                return false;
            }
            match date.next_day() {
                Some(next) => date = next,
                None => return false,
            }
        }
    }

    /// Next trigger instant strictly after `from`, if any weekday is configured.
    pub fn next_after(&self, from: PrimitiveDateTime) -> Option<PrimitiveDateTime> {
        let mut date: Date = from.date();
        for _ in 0..=7 {
            let candidate = PrimitiveDateTime::new(date, self.at);
            if self.fires_on(date.weekday()) && candidate > from {
                return Some(candidate);
            }
            date = date.next_day()?;
        }
        None
    }
}

impl Default for DayTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_TIME, DEFAULT_TRIGGER_WEEKDAYS)
    }
}

/// Samples the clock every `check_interval` and raises `signal` on each trigger crossing.
pub fn spawn_scheduler_thread(
    trigger: DayTrigger,
    signal: RolloverSignal,
    clock: Arc<dyn Clock>,
    stop: Arc<AtomicBool>,
    check_interval: Duration,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut previous = clock.local();
        match trigger.next_after(previous) {
            Some(next) => info!(next = %next, "Day-boundary scheduler started"),
            None => info!("Day-boundary scheduler started without weekdays, never fires"),
        }

        while !stop.load(Ordering::Relaxed) {
            sleep_with_stop(check_interval, &stop, Instant::now());
            let current = clock.local();
            if trigger.crossed(previous, current) {
                info!(at = %current, "Day boundary reached, requesting rollover");
                signal.raise();
                if let Some(next) = trigger.next_after(current) {
                    debug!(next = %next, "Next day boundary scheduled");
                }
            }
            previous = current;
        }
    })
}
