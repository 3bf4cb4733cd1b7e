use thiserror::Error;

pub mod daily;
pub mod weekly;

pub use daily::{DailyAggregator, DailySummary, OperatingWindow};
pub use weekly::{WeeklyAggregator, WeeklyRow};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("stored daily summary has {found} buckets, window expects {expected}")]
    BucketMismatch { expected: usize, found: usize },
    #[error("daily summary day count overflowed")]
    DayCountOverflow,
}
