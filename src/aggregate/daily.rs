//! Running per-bucket occupancy averages across operating days.

use crate::aggregate::AggregateError;
use crate::counter::{DayLog, EventKind};
use crate::estimation::seconds_of_day;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use time::Time;
use time::macros::time;

pub const DEFAULT_OPENING: Time = time!(11:00);
pub const DEFAULT_CLOSING: Time = time!(14:00);
pub const DEFAULT_BUCKET_WIDTH: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("closing time {closing} must be after opening time {opening}")]
    Inverted { opening: Time, closing: Time },
    #[error("bucket width must be a whole number of seconds greater than zero")]
    ZeroWidth,
}

/// Opening hours split into fixed-width buckets labelled by their start.
///
/// Both ends are inclusive, so `span / width + 1` buckets cover the window and the
/// last bucket starts at (or just before) closing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingWindow {
    opening: Time,
    closing: Time,
    bucket_secs: u32,
}

impl OperatingWindow {
    pub fn new(opening: Time, closing: Time, bucket_width: Duration) -> Result<Self, WindowError> {
        if closing <= opening {
            return Err(WindowError::Inverted { opening, closing });
        }
        let bucket_secs = u32::try_from(bucket_width.as_secs()).unwrap_or(u32::MAX);
        if bucket_secs == 0 {
            return Err(WindowError::ZeroWidth);
        }
        Ok(Self {
            opening,
            closing,
            bucket_secs,
        })
    }

    pub fn opening(&self) -> Time {
        self.opening
    }

    pub fn closing(&self) -> Time {
        self.closing
    }

    pub fn bucket_width(&self) -> Duration {
        Duration::from_secs(u64::from(self.bucket_secs))
    }

    pub fn bucket_count(&self) -> usize {
        (self.span_secs() / self.bucket_secs) as usize + 1
    }

    pub fn contains(&self, time: Time) -> bool {
        (self.opening..=self.closing).contains(&time)
    }

    pub fn bucket_index(&self, time: Time) -> Option<usize> {
        if !self.contains(time) {
            return None;
        }
        let offset = seconds_of_day(time) - seconds_of_day(self.opening);
        Some((offset / self.bucket_secs) as usize)
    }

    /// `HH:MM` start label of every bucket.
    pub fn bucket_labels(&self) -> Vec<String> {
        let opening = seconds_of_day(self.opening);
        (0..self.bucket_count() as u32)
            .map(|index| {
                let start = opening + index * self.bucket_secs;
                format!("{:02}:{:02}", start / 3600, (start % 3600) / 60)
            })
            .collect()
    }

    fn span_secs(&self) -> u32 {
        seconds_of_day(self.closing) - seconds_of_day(self.opening)
    }
}

impl Default for OperatingWindow {
    fn default() -> Self {
        Self {
            opening: DEFAULT_OPENING,
            closing: DEFAULT_CLOSING,
            bucket_secs: DEFAULT_BUCKET_WIDTH.as_secs() as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub day_count: u64,
    pub buckets: Vec<f64>,
}

impl DailySummary {
    /// Summary before any day has been folded in.
    pub fn empty(bucket_count: usize) -> Self {
        Self {
            day_count: 0,
            buckets: vec![0.0; bucket_count],
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DailyAggregator {
    window: OperatingWindow,
}

impl DailyAggregator {
    pub fn new(window: OperatingWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &OperatingWindow {
        &self.window
    }

    /// Occupancy at the end of every bucket for one day's log.
    ///
    /// Entries and occupancy exits inside the window are replayed in arrival order
    /// from zero; queue exits do not move the count. Buckets without events carry
    /// the previous bucket's value forward.
    pub fn bucket_occupancy(&self, log: &DayLog) -> Vec<u32> {
        let mut ends: Vec<Option<u32>> = vec![None; self.window.bucket_count()];
        let mut occupancy = 0u32;

        for event in log.iter() {
            let Some(index) = self.window.bucket_index(event.timestamp) else {
                continue;
            };
            match event.kind {
                EventKind::Entry => occupancy = occupancy.saturating_add(1),
                EventKind::OccupancyExit => occupancy = occupancy.saturating_sub(1),
                EventKind::QueueExit => {}
            }
            ends[index] = Some(occupancy);
        }

        let mut carried = 0u32;
        ends.into_iter()
            .map(|end| {
                carried = end.unwrap_or(carried);
                carried
            })
            .collect()
    }

    /// Folds one day into the running average and bumps the day count.
    pub fn fold(
        &self,
        log: &DayLog,
        previous: &DailySummary,
    ) -> Result<DailySummary, AggregateError> {
        let expected = self.window.bucket_count();
        if previous.buckets.len() != expected {
            return Err(AggregateError::BucketMismatch {
                expected,
                found: previous.buckets.len(),
            });
        }
        let day_count = previous
            .day_count
            .checked_add(1)
            .ok_or(AggregateError::DayCountOverflow)?;

        // prev + (cur - prev) / n keeps the magnitude bounded for any day count
        let weight = day_count as f64;
        let buckets = previous
            .buckets
            .iter()
            .zip(self.bucket_occupancy(log))
            .map(|(average, current)| average + (f64::from(current) - average) / weight)
            .collect();

        Ok(DailySummary { day_count, buckets })
    }
}
