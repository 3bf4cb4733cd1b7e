//! Queue wait time estimation from the day's event log.
//!
//! Two interchangeable strategies implement [`QueueTimeEstimator`]; the policy is
//! picked from `[estimation]` in the config file.

use crate::counter::DayLog;
use serde::Deserialize;
use std::time::Duration;
use time::Time;

pub mod paired;
pub mod throughput;

use paired::{DEFAULT_MAX_PAIRS, PairedDepartureEstimator};
use throughput::{DEFAULT_WINDOW, ThroughputWindowEstimator};

/// Strategy for turning recent events into an estimated wait.
pub trait QueueTimeEstimator: Send + Sync + std::fmt::Debug {
    /// Estimated wait in minutes; never negative, zero when history is insufficient.
    fn estimate(&self, log: &DayLog, queue_length: u32, now: Time) -> f64;

    fn policy(&self) -> EstimationPolicy;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationPolicy {
    #[default]
    PairedDeparture,
    ThroughputWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimationSettings {
    pub policy: EstimationPolicy,
    pub window: Duration,
    pub max_pairs: usize,
}

impl Default for EstimationSettings {
    fn default() -> Self {
        Self {
            policy: EstimationPolicy::default(),
            window: DEFAULT_WINDOW,
            max_pairs: DEFAULT_MAX_PAIRS,
        }
    }
}

pub fn create_estimator(settings: &EstimationSettings) -> Box<dyn QueueTimeEstimator> {
    match settings.policy {
        EstimationPolicy::PairedDeparture => {
            Box::new(PairedDepartureEstimator::new(settings.max_pairs))
        }
        EstimationPolicy::ThroughputWindow => {
            let window_secs = u32::try_from(settings.window.as_secs()).unwrap_or(u32::MAX);
            Box::new(ThroughputWindowEstimator::new(window_secs))
        }
    }
}

pub(crate) fn seconds_of_day(time: Time) -> u32 {
    u32::from(time.hour()) * 3600 + u32::from(time.minute()) * 60 + u32::from(time.second())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::time;

    #[test]
    fn factory_honours_policy() {
        let paired = create_estimator(&EstimationSettings::default());
        let throughput = create_estimator(&EstimationSettings {
            policy: EstimationPolicy::ThroughputWindow,
            ..EstimationSettings::default()
        });

        assert_eq!(paired.policy(), EstimationPolicy::PairedDeparture);
        assert_eq!(throughput.policy(), EstimationPolicy::ThroughputWindow);
    }

    #[test]
    fn seconds_of_day_ignores_subseconds() {
        assert_eq!(seconds_of_day(time!(00:00)), 0);
        assert_eq!(seconds_of_day(time!(11:05:30.900)), 11 * 3600 + 5 * 60 + 30);
        assert_eq!(seconds_of_day(time!(23:59:59)), 86_399);
    }
}
