use crate::aggregate::{DailySummary, WeeklyRow};
use crate::counter::Snapshot;
use crate::store::{CurrentValues, StateStore, StoreError};
use std::sync::Mutex;

/// Which operations fail. Flags stay set until replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStoreBehavior {
    pub fail_write_snapshot: bool,
    pub fail_read_daily: bool,
    pub fail_write_daily: bool,
    pub fail_append_weekly: bool,
}

impl MemoryStoreBehavior {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn fail_write_snapshot() -> Self {
        Self {
            fail_write_snapshot: true,
            ..Self::default()
        }
    }

    pub fn fail_read_daily() -> Self {
        Self {
            fail_read_daily: true,
            ..Self::default()
        }
    }

    pub fn fail_write_daily() -> Self {
        Self {
            fail_write_daily: true,
            ..Self::default()
        }
    }

    pub fn fail_append_weekly() -> Self {
        Self {
            fail_append_weekly: true,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct Inner {
    behavior: MemoryStoreBehavior,
    snapshot: Option<CurrentValues>,
    snapshot_writes: usize,
    daily: Option<DailySummary>,
    weekly: Vec<WeeklyRow>,
}

/// In-process store with injectable failures.
#[derive(Debug)]
pub struct MemoryStateStore {
    inner: Mutex<Inner>,
}

impl MemoryStateStore {
    pub fn new(bucket_count: usize) -> Self {
        Self::with_daily(Some(DailySummary::empty(bucket_count)))
    }

    /// `None` simulates a missing daily summary.
    pub fn with_daily(daily: Option<DailySummary>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                behavior: MemoryStoreBehavior::ok(),
                snapshot: None,
                snapshot_writes: 0,
                daily,
                weekly: Vec::new(),
            }),
        }
    }

    pub fn set_behavior(&self, behavior: MemoryStoreBehavior) -> Result<(), StoreError> {
        self.lock()?.behavior = behavior;
        Ok(())
    }

    pub fn snapshot_writes(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.snapshot_writes)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Lock)
    }
}

impl StateStore for MemoryStateStore {
    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.behavior.fail_write_snapshot {
            return Err(StoreError::Injected("write snapshot"));
        }
        inner.snapshot = Some(CurrentValues::from(snapshot));
        inner.snapshot_writes += 1;
        Ok(())
    }

    fn read_snapshot(&self) -> Result<Option<CurrentValues>, StoreError> {
        Ok(self.lock()?.snapshot)
    }

    fn read_daily(&self) -> Result<DailySummary, StoreError> {
        let inner = self.lock()?;
        if inner.behavior.fail_read_daily {
            return Err(StoreError::Injected("read daily"));
        }
        inner.daily.clone().ok_or_else(|| StoreError::Missing {
            path: "memory://daily".into(),
        })
    }

    fn write_daily(&self, summary: &DailySummary) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.behavior.fail_write_daily {
            return Err(StoreError::Injected("write daily"));
        }
        inner.daily = Some(summary.clone());
        Ok(())
    }

    fn append_weekly(&self, row: &WeeklyRow) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.behavior.fail_append_weekly {
            return Err(StoreError::Injected("append weekly"));
        }
        inner.weekly.push(row.clone());
        Ok(())
    }

    fn read_weekly(&self) -> Result<Vec<WeeklyRow>, StoreError> {
        Ok(self.lock()?.weekly.clone())
    }
}
