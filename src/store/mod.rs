//! Durable state: the live snapshot, the running daily averages and the weekly series.

use crate::aggregate::{DailySummary, WeeklyRow};
use crate::counter::Snapshot;
use std::path::PathBuf;
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path} is missing")]
    Missing { path: PathBuf },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {path} at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("injected failure: {0}")]
    Injected(&'static str),
    #[error("store lock poisoned")]
    Lock,
}

/// The three fields persisted after every event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentValues {
    pub occupancy: u32,
    pub queue_length: u32,
    pub estimated_queue_time_minutes: f64,
}

impl From<&Snapshot> for CurrentValues {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            occupancy: snapshot.occupancy,
            queue_length: snapshot.queue_length,
            estimated_queue_time_minutes: snapshot.estimated_queue_time_minutes,
        }
    }
}

pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Overwrites the current snapshot in place.
    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// `None` when nothing has been written yet.
    fn read_snapshot(&self) -> Result<Option<CurrentValues>, StoreError>;

    fn read_daily(&self) -> Result<DailySummary, StoreError>;

    /// Replaces the daily summary as a whole; a failed write leaves the old one intact.
    fn write_daily(&self, summary: &DailySummary) -> Result<(), StoreError>;

    fn append_weekly(&self, row: &WeeklyRow) -> Result<(), StoreError>;

    fn read_weekly(&self) -> Result<Vec<WeeklyRow>, StoreError>;
}
