//! Paired-departure policy.
//!
//! The i-th most recent queue exit is matched with the entry `queue_length + 1 + i`
//! positions back in entry order: that many people entered after the one who just
//! reached the register. The estimate is the mean entry-to-exit span of the pairs.

use crate::counter::{DayLog, EventKind};
use crate::estimation::{EstimationPolicy, QueueTimeEstimator, seconds_of_day};
use time::Time;

pub const DEFAULT_MAX_PAIRS: usize = 10;

#[derive(Debug, Clone)]
pub struct PairedDepartureEstimator {
    max_pairs: usize,
}

impl PairedDepartureEstimator {
    pub fn new(max_pairs: usize) -> Self {
        Self { max_pairs }
    }

    pub fn max_pairs(&self) -> usize {
        self.max_pairs
    }
}

impl Default for PairedDepartureEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAIRS)
    }
}

impl QueueTimeEstimator for PairedDepartureEstimator {
    fn estimate(&self, log: &DayLog, queue_length: u32, _now: Time) -> f64 {
        let entries: Vec<u32> = log
            .iter()
            .rev()
            .filter(|event| event.kind == EventKind::Entry)
            .map(|event| seconds_of_day(event.timestamp))
            .collect();
        let offset = queue_length as usize + 1;

        let mut total_secs = 0u64;
        let mut pairs = 0u32;
        let exits = log
            .iter()
            .rev()
            .filter(|event| event.kind == EventKind::QueueExit)
            .take(self.max_pairs);
        for (index, exit) in exits.enumerate() {
            // Backward indices only grow, so the first gap ends the scan.
            let Some(entered) = entries.get(index + offset) else {
                break;
            };
            total_secs += u64::from(seconds_of_day(exit.timestamp).saturating_sub(*entered));
            pairs += 1;
        }

        if pairs == 0 {
            return 0.0;
        }
        total_secs as f64 / (f64::from(pairs) * 60.0)
    }

    fn policy(&self) -> EstimationPolicy {
        EstimationPolicy::PairedDeparture
    }
}
