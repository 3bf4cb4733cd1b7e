//! Throughput-window policy.
//!
//! Formula: wait_minutes = queue_length * window_minutes / entries_in_window

use crate::counter::{DayLog, EventKind};
use crate::estimation::{EstimationPolicy, QueueTimeEstimator, seconds_of_day};
use std::time::Duration;
use time::Time;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(100);

/// Estimates the wait from the recent arrival rate.
///
/// Entries are counted in the inclusive window `[now - window, now]`. The window
/// start saturates at midnight instead of wrapping into the previous day.
#[derive(Debug, Clone)]
pub struct ThroughputWindowEstimator {
    window_secs: u32,
}

impl ThroughputWindowEstimator {
    pub fn new(window_secs: u32) -> Self {
        Self {
            window_secs: window_secs.max(1),
        }
    }

    pub fn window_secs(&self) -> u32 {
        self.window_secs
    }

    fn entries_in_window(&self, log: &DayLog, now: Time) -> usize {
        let end = seconds_of_day(now);
        let start = end.saturating_sub(self.window_secs);
        log.iter()
            .filter(|event| event.kind == EventKind::Entry)
            .filter(|event| (start..=end).contains(&seconds_of_day(event.timestamp)))
            .count()
    }
}

impl Default for ThroughputWindowEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW.as_secs() as u32)
    }
}

impl QueueTimeEstimator for ThroughputWindowEstimator {
    fn estimate(&self, log: &DayLog, queue_length: u32, now: Time) -> f64 {
        let entries = self.entries_in_window(log, now);
        if entries == 0 {
            return 0.0;
        }
        let window_minutes = f64::from(self.window_secs) / 60.0;
        f64::from(queue_length) * window_minutes / entries as f64
    }

    fn policy(&self) -> EstimationPolicy {
        EstimationPolicy::ThroughputWindow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::Event;
    use time::macros::time;

    fn log(events: &[(Time, EventKind)]) -> DayLog {
        events
            .iter()
            .map(|(timestamp, kind)| Event::new(*timestamp, *kind))
            .collect()
    }

    #[test]
    fn no_entries_in_window_returns_zero() {
        let estimator = ThroughputWindowEstimator::default();
        let log = log(&[
            (time!(11:00:00), EventKind::Entry),
            (time!(11:00:30), EventKind::Entry),
        ]);

        let estimate = estimator.estimate(&log, 12, time!(11:10:00));

        assert_eq!(estimate, 0.0);
        assert!(estimate.is_finite());
    }

    #[test]
    fn empty_log_returns_zero() {
        let estimator = ThroughputWindowEstimator::default();

        assert_eq!(estimator.estimate(&DayLog::new(), 3, time!(12:00)), 0.0);
    }

    #[test]
    fn wait_scales_queue_by_arrival_rate() {
        let estimator = ThroughputWindowEstimator::new(120);
        let log = log(&[
            (time!(11:58:00), EventKind::Entry),
            (time!(11:59:00), EventKind::Entry),
            (time!(11:59:30), EventKind::QueueExit),
            (time!(12:00:00), EventKind::Entry),
            (time!(12:00:00), EventKind::OccupancyExit),
        ]);

        // 3 entries over 2 minutes, 6 queued: 6 * 2 / 3
        let estimate = estimator.estimate(&log, 6, time!(12:00:00));

        assert_eq!(estimate, 4.0);
    }

    #[test]
    fn entries_after_now_are_ignored() {
        let estimator = ThroughputWindowEstimator::new(60);
        let log = log(&[
            (time!(12:00:00), EventKind::Entry),
            (time!(12:00:30), EventKind::Entry),
        ]);

        let estimate = estimator.estimate(&log, 2, time!(12:00:10));

        assert_eq!(estimate, 2.0);
    }

    #[test]
    fn window_does_not_wrap_past_midnight() {
        let estimator = ThroughputWindowEstimator::new(100);
        let log = log(&[
            (time!(23:59:30), EventKind::Entry),
            (time!(00:00:10), EventKind::Entry),
        ]);

        let estimate = estimator.estimate(&log, 1, time!(00:00:20));

        // only the 00:00:10 entry is inside the window
        assert_eq!(estimate, 100.0 / 60.0);
    }
}
