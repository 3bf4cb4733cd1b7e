//! The single owner of the live counters.
//!
//! Events and day-boundary rollovers are serialized on this thread, so a fold
//! always sees a complete day log and no event is applied half way through one.

use crate::aggregate::{AggregateError, DailyAggregator, DailySummary, WeeklyAggregator, WeeklyRow};
use crate::clock::Clock;
use crate::counter::{Event, OccupancyCounter, Snapshot};
use crate::cycle::{CyclePhase, RolloverReason, RolloverSignal, sleep_with_stop};
use crate::error::AppError;
use crate::source::SourceMessage;
use crate::state::{AppState, RolloverRecord};
use crate::store::{StateStore, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use time::Date;
use tracing::{debug, error, info, warn};

pub const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum RolloverError {
    #[error("failed to read daily summary: {0}")]
    ReadDaily(#[source] StoreError),
    #[error("failed to fold day into daily summary: {0}")]
    Fold(#[source] AggregateError),
    #[error("failed to append weekly row: {0}")]
    AppendWeekly(#[source] StoreError),
    #[error("failed to write daily summary: {0}")]
    WriteDaily(#[source] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RolloverOutcome {
    pub closing_date: Date,
    pub events_folded: usize,
    pub daily: DailySummary,
    /// `None` when the row was already written by an earlier, partially failed attempt.
    pub weekly_row: Option<WeeklyRow>,
}

#[derive(Debug)]
pub struct IngestionWorker {
    counter: OccupancyCounter,
    aggregator: DailyAggregator,
    store: Arc<dyn StateStore>,
    state: Arc<RwLock<AppState>>,
    signal: RolloverSignal,
    clock: Arc<dyn Clock>,
    /// Local date of the day currently being counted. Only a successful rollover
    /// moves it.
    cycle_date: Date,
    /// Set while a rollover has started but not completed.
    rollover_pending: bool,
    /// Closing date whose weekly row is on disk while its daily write is still pending.
    weekly_written_for: Option<Date>,
    idle_poll: Duration,
}

impl IngestionWorker {
    pub fn new(
        counter: OccupancyCounter,
        aggregator: DailyAggregator,
        store: Arc<dyn StateStore>,
        state: Arc<RwLock<AppState>>,
        signal: RolloverSignal,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cycle_date = clock.local().date();
        Self {
            counter,
            aggregator,
            store,
            state,
            signal,
            clock,
            cycle_date,
            rollover_pending: false,
            weekly_written_for: None,
            idle_poll: DEFAULT_IDLE_POLL,
        }
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    pub fn counter(&self) -> &OccupancyCounter {
        &self.counter
    }

    pub fn cycle_date(&self) -> Date {
        self.cycle_date
    }

    pub fn rollover_pending(&self) -> bool {
        self.rollover_pending
    }

    /// Applies one event, persists the snapshot and publishes it.
    ///
    /// When an earlier rollover failed and the date has moved on, the pending day
    /// is folded first so the event lands on its own day.
    pub fn ingest(&mut self, event: Event) -> Snapshot {
        if self.rollover_pending && self.clock.local().date() > self.cycle_date {
            self.try_rollover(RolloverReason::Retry);
        }
        let snapshot = self.counter.apply(event);
        self.publish(snapshot);
        snapshot
    }

    /// Folds the closing day into both summaries and resets the counter.
    ///
    /// Nothing is written and nothing is reset unless the daily summary was read and
    /// folded. The counter is only reset once the new daily summary is on disk.
    pub fn roll_over(&mut self) -> Result<RolloverOutcome, RolloverError> {
        let closing_date = self.cycle_date;
        self.rollover_pending = true;
        let previous = self.store.read_daily().map_err(RolloverError::ReadDaily)?;
        let daily = self
            .aggregator
            .fold(self.counter.log(), &previous)
            .map_err(RolloverError::Fold)?;

        let weekly_row = if self.weekly_written_for == Some(closing_date) {
            debug!(%closing_date, "Weekly row already written, skipping append");
            None
        } else {
            let peak = self.counter.state().max_occupancy_today;
            let row = WeeklyAggregator::append(self.store.as_ref(), closing_date, peak)
                .map_err(RolloverError::AppendWeekly)?;
            self.weekly_written_for = Some(closing_date);
            Some(row)
        };

        self.store
            .write_daily(&daily)
            .map_err(RolloverError::WriteDaily)?;

        let events_folded = self.counter.log().len();
        self.counter.reset();
        self.rollover_pending = false;
        self.weekly_written_for = None;
        let now = self.clock.local();
        self.cycle_date = now.date();
        self.publish(self.counter.snapshot_at(now.time()));

        Ok(RolloverOutcome {
            closing_date,
            events_folded,
            daily,
            weekly_row,
        })
    }

    /// Runs one rollover with the phase set to `Rolling` and records its outcome.
    pub fn handle_rollover(
        &mut self,
        reason: RolloverReason,
    ) -> Result<RolloverOutcome, RolloverError> {
        let closing_date = self.cycle_date;
        self.update_state(|state| state.set_phase(CyclePhase::Rolling));

        let result = self.roll_over();
        match &result {
            Ok(outcome) => info!(
                closing_date = %outcome.closing_date,
                reason = ?reason,
                events = outcome.events_folded,
                day_count = outcome.daily.day_count,
                "Day rolled over"
            ),
            Err(err) => error!(
                %closing_date,
                reason = ?reason,
                error = %err,
                "Rollover aborted, keeping counters for the next trigger"
            ),
        }

        let record = RolloverRecord {
            closing_date,
            reason,
            finished_at: self.clock.now(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        self.update_state(move |state| {
            state.set_last_rollover(record);
            state.set_phase(CyclePhase::Running);
        });
        result
    }

    /// Consumes events until `stop` is set. A closed channel leaves the worker
    /// idling so scheduled rollovers still run.
    pub fn run(mut self, rx: Receiver<SourceMessage>, stop: Arc<AtomicBool>) {
        info!(cycle_date = %self.cycle_date, "Ingestion worker started");
        let mut connected = true;

        while !stop.load(Ordering::Relaxed) {
            if self.signal.take() {
                self.try_rollover(RolloverReason::Scheduled);
            }

            if !connected {
                sleep_with_stop(self.idle_poll, &stop, Instant::now());
                continue;
            }

            match rx.recv_timeout(self.idle_poll) {
                Ok(SourceMessage::Event(event)) => {
                    self.ingest(event);
                }
                Ok(SourceMessage::EndOfStream) => {
                    self.try_rollover(RolloverReason::EndOfStream);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Event source closed, waiting for day boundaries only");
                    connected = false;
                }
            }
        }

        info!("Ingestion worker stopped");
    }

    /// Failures are already logged and recorded in `AppState`; the counters stay
    /// put for the next attempt.
    fn try_rollover(&mut self, reason: RolloverReason) {
        if let Err(err) = self.handle_rollover(reason) {
            debug!(error = %err, reason = ?reason, "Rollover left pending");
        }
    }

    fn publish(&self, snapshot: Snapshot) {
        if let Err(err) = self.store.write_snapshot(&snapshot) {
            warn!(error = %err, "Snapshot write failed");
        }
        let at = self.clock.now();
        self.update_state(|state| state.set_snapshot(snapshot, at));
    }

    fn update_state(&self, apply: impl FnOnce(&mut AppState)) {
        let result = self
            .state
            .write()
            .map(|mut guard| apply(&mut guard))
            .map_err(|_| AppError::StateLock);
        if let Err(err) = result {
            warn!(error = %err, "Shared state not updated");
        }
    }
}

pub fn spawn_ingestion_thread(
    worker: IngestionWorker,
    rx: Receiver<SourceMessage>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || worker.run(rx, stop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::OperatingWindow;
    use crate::clock::ManualClock;
    use crate::counter::{CounterLimits, EventKind};
    use crate::estimation::paired::PairedDepartureEstimator;
    use crate::store::memory::{MemoryStateStore, MemoryStoreBehavior};
    use std::error::Error;
    use std::sync::mpsc;
    use time::macros::{date, datetime, time};

    struct Fixture {
        worker: IngestionWorker,
        store: Arc<MemoryStateStore>,
        state: Arc<RwLock<AppState>>,
        clock: Arc<ManualClock>,
        signal: RolloverSignal,
    }

    fn fixture(store: MemoryStateStore) -> Fixture {
        let store = Arc::new(store);
        let state = Arc::new(RwLock::new(AppState::new()));
        let clock = Arc::new(ManualClock::new(datetime!(2026-03-02 11:00 UTC)));
        let signal = RolloverSignal::new();
        let counter = OccupancyCounter::new(
            CounterLimits::default(),
            Box::new(PairedDepartureEstimator::default()),
        );
        let worker = IngestionWorker::new(
            counter,
            DailyAggregator::new(OperatingWindow::default()),
            store.clone(),
            Arc::clone(&state),
            signal.clone(),
            clock.clone(),
        )
        .with_idle_poll(Duration::from_millis(10));
        Fixture {
            worker,
            store,
            state,
            clock,
            signal,
        }
    }

    fn lunch(worker: &mut IngestionWorker) {
        worker.ingest(Event::new(time!(11:00), EventKind::Entry));
        worker.ingest(Event::new(time!(11:05), EventKind::Entry));
        worker.ingest(Event::new(time!(11:20), EventKind::OccupancyExit));
    }

    #[test]
    fn ingest_persists_and_publishes_snapshot() -> Result<(), Box<dyn Error>> {
        let mut fx = fixture(MemoryStateStore::new(7));

        let snapshot = fx
            .worker
            .ingest(Event::new(time!(11:00), EventKind::Entry));

        assert_eq!(snapshot.occupancy, 1);
        assert_eq!(fx.store.snapshot_writes()?, 1);
        let stored = fx.store.read_snapshot()?.ok_or("snapshot not stored")?;
        assert_eq!(stored.occupancy, 1);
        assert_eq!(stored.queue_length, 1);
        let guard = fx.state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.snapshot(), &snapshot);
        Ok(())
    }

    #[test]
    fn snapshot_write_failure_does_not_stop_ingestion() -> Result<(), Box<dyn Error>> {
        let mut fx = fixture(MemoryStateStore::new(7));
        fx.store
            .set_behavior(MemoryStoreBehavior::fail_write_snapshot())?;

        lunch(&mut fx.worker);

        assert_eq!(fx.worker.counter().log().len(), 3);
        assert_eq!(fx.store.snapshot_writes()?, 0);
        let guard = fx.state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.snapshot().max_occupancy_today, 2);
        Ok(())
    }

    #[test]
    fn rollover_folds_day_and_resets_counter() -> Result<(), Box<dyn Error>> {
        let mut fx = fixture(MemoryStateStore::new(7));
        lunch(&mut fx.worker);
        fx.clock.set(datetime!(2026-03-03 00:00 UTC));

        let outcome = fx.worker.handle_rollover(RolloverReason::Scheduled)?;

        assert_eq!(outcome.closing_date, date!(2026 - 03 - 02));
        assert_eq!(outcome.events_folded, 3);
        assert_eq!(outcome.daily.day_count, 1);
        assert_eq!(outcome.daily.buckets, vec![1.0; 7]);
        assert_eq!(fx.store.read_daily()?, outcome.daily);

        let weekly = fx.store.read_weekly()?;
        assert_eq!(weekly, vec![WeeklyRow::new(date!(2026 - 03 - 02), 2)]);
        assert_eq!(weekly[0].weekday, "monday");

        assert!(fx.worker.counter().log().is_empty());
        assert_eq!(fx.worker.counter().state().max_occupancy_today, 0);
        assert_eq!(fx.worker.cycle_date(), date!(2026 - 03 - 03));

        let guard = fx.state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.phase(), CyclePhase::Running);
        assert_eq!(guard.snapshot().occupancy, 0);
        let record = guard.last_rollover().ok_or("rollover not recorded")?;
        assert!(record.succeeded());
        Ok(())
    }

    #[test]
    fn missing_daily_summary_aborts_without_writes() -> Result<(), Box<dyn Error>> {
        let mut fx = fixture(MemoryStateStore::with_daily(None));
        lunch(&mut fx.worker);

        let result = fx.worker.handle_rollover(RolloverReason::Scheduled);

        assert!(matches!(result, Err(RolloverError::ReadDaily(_))));
        assert!(fx.store.read_weekly()?.is_empty());
        assert_eq!(fx.worker.counter().log().len(), 3);
        assert_eq!(fx.worker.counter().state().occupancy, 1);

        let guard = fx.state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.phase(), CyclePhase::Running);
        let record = guard.last_rollover().ok_or("rollover not recorded")?;
        assert!(!record.succeeded());
        Ok(())
    }

    #[test]
    fn corrupt_daily_summary_aborts_fold() -> Result<(), Box<dyn Error>> {
        let mut fx = fixture(MemoryStateStore::new(5));
        lunch(&mut fx.worker);

        let result = fx.worker.roll_over();

        assert!(matches!(
            result,
            Err(RolloverError::Fold(AggregateError::BucketMismatch {
                expected: 7,
                found: 5
            }))
        ));
        assert!(fx.store.read_weekly()?.is_empty());
        assert_eq!(fx.store.read_daily()?.buckets.len(), 5);
        assert_eq!(fx.worker.counter().log().len(), 3);
        Ok(())
    }

    #[test]
    fn retry_after_daily_write_failure_appends_weekly_once() -> Result<(), Box<dyn Error>> {
        let mut fx = fixture(MemoryStateStore::new(7));
        lunch(&mut fx.worker);
        fx.store.set_behavior(MemoryStoreBehavior::fail_write_daily())?;

        let first = fx.worker.roll_over();

        assert!(matches!(first, Err(RolloverError::WriteDaily(_))));
        assert_eq!(fx.store.read_weekly()?.len(), 1);
        assert_eq!(fx.store.read_daily()?.day_count, 0);
        assert_eq!(fx.worker.counter().log().len(), 3);

        fx.store.set_behavior(MemoryStoreBehavior::ok())?;
        let second = fx.worker.roll_over()?;

        assert!(second.weekly_row.is_none());
        assert_eq!(fx.store.read_weekly()?.len(), 1);
        assert_eq!(fx.store.read_daily()?.day_count, 1);
        assert!(fx.worker.counter().log().is_empty());
        Ok(())
    }

    #[test]
    fn failed_rollover_is_folded_before_next_day_events() -> Result<(), Box<dyn Error>> {
        let mut fx = fixture(MemoryStateStore::new(7));
        lunch(&mut fx.worker);
        fx.store.set_behavior(MemoryStoreBehavior::fail_write_daily())?;
        fx.clock.set(datetime!(2026-03-03 00:00 UTC));

        let first = fx.worker.handle_rollover(RolloverReason::Scheduled);

        assert!(matches!(first, Err(RolloverError::WriteDaily(_))));
        assert!(fx.worker.rollover_pending());
        assert_eq!(fx.worker.cycle_date(), date!(2026 - 03 - 02));

        // Store recovers; the first event of Tuesday closes Monday first.
        fx.store.set_behavior(MemoryStoreBehavior::ok())?;
        fx.clock.set(datetime!(2026-03-03 11:00 UTC));
        let snapshot = fx
            .worker
            .ingest(Event::new(time!(11:00), EventKind::Entry));

        assert!(!fx.worker.rollover_pending());
        assert_eq!(fx.worker.cycle_date(), date!(2026 - 03 - 03));
        assert_eq!(snapshot.occupancy, 1);
        assert_eq!(snapshot.max_occupancy_today, 1);
        assert_eq!(fx.worker.counter().log().len(), 1);
        {
            let guard = fx.state.read().map_err(|_| AppError::StateLock)?;
            let record = guard.last_rollover().ok_or("rollover not recorded")?;
            assert!(record.succeeded());
            assert_eq!(record.reason, RolloverReason::Retry);
            assert_eq!(record.closing_date, date!(2026 - 03 - 02));
        }

        fx.clock.set(datetime!(2026-03-04 00:00 UTC));
        let second = fx.worker.handle_rollover(RolloverReason::Scheduled)?;

        assert_eq!(second.closing_date, date!(2026 - 03 - 03));
        assert_eq!(
            fx.store.read_weekly()?,
            vec![
                WeeklyRow::new(date!(2026 - 03 - 02), 2),
                WeeklyRow::new(date!(2026 - 03 - 03), 1),
            ]
        );
        let daily = fx.store.read_daily()?;
        assert_eq!(daily.day_count, 2);
        assert_eq!(daily.buckets, vec![1.0; 7]);
        Ok(())
    }

    #[test]
    fn events_on_the_same_day_do_not_retry_rollover() -> Result<(), Box<dyn Error>> {
        let mut fx = fixture(MemoryStateStore::new(7));
        lunch(&mut fx.worker);
        fx.store.set_behavior(MemoryStoreBehavior::fail_write_daily())?;
        assert!(fx.worker.roll_over().is_err());
        fx.store.set_behavior(MemoryStoreBehavior::ok())?;

        fx.worker
            .ingest(Event::new(time!(11:30), EventKind::Entry));

        assert!(fx.worker.rollover_pending());
        assert_eq!(fx.worker.counter().log().len(), 4);
        assert_eq!(fx.store.read_daily()?.day_count, 0);
        assert_eq!(fx.store.read_weekly()?.len(), 1);
        Ok(())
    }

    #[test]
    fn weekly_append_failure_keeps_counters() -> Result<(), Box<dyn Error>> {
        let mut fx = fixture(MemoryStateStore::new(7));
        lunch(&mut fx.worker);
        fx.store
            .set_behavior(MemoryStoreBehavior::fail_append_weekly())?;

        let result = fx.worker.roll_over();

        assert!(matches!(result, Err(RolloverError::AppendWeekly(_))));
        assert_eq!(fx.store.read_daily()?.day_count, 0);
        assert_eq!(fx.worker.counter().log().len(), 3);
        Ok(())
    }

    #[test]
    fn run_applies_events_and_rolls_over_on_end_of_stream() -> Result<(), Box<dyn Error>> {
        let fx = fixture(MemoryStateStore::new(7));
        let (tx, rx) = mpsc::sync_channel(16);
        let stop = Arc::new(AtomicBool::new(false));

        tx.send(SourceMessage::Event(Event::new(time!(11:00), EventKind::Entry)))?;
        tx.send(SourceMessage::Event(Event::new(time!(11:40), EventKind::Entry)))?;
        tx.send(SourceMessage::EndOfStream)?;
        // buffered behind the rollover, counted on the new day
        tx.send(SourceMessage::Event(Event::new(time!(11:45), EventKind::Entry)))?;
        drop(tx);

        let handle = spawn_ingestion_thread(fx.worker, rx, Arc::clone(&stop));
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let done = {
                let guard = fx.state.read().map_err(|_| AppError::StateLock)?;
                guard.last_rollover().is_some() && guard.snapshot().queue_length == 1
            };
            if done || Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        stop.store(true, Ordering::Relaxed);
        handle.join().map_err(|_| "worker thread panicked")?;

        let daily = fx.store.read_daily()?;
        assert_eq!(daily.day_count, 1);
        assert_eq!(daily.buckets, vec![1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0]);
        assert_eq!(fx.store.read_weekly()?.len(), 1);
        let guard = fx.state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.snapshot().occupancy, 1);
        Ok(())
    }

    #[test]
    fn run_honours_scheduled_signal_without_events() -> Result<(), Box<dyn Error>> {
        let fx = fixture(MemoryStateStore::new(7));
        let (tx, rx) = mpsc::sync_channel::<SourceMessage>(1);
        let stop = Arc::new(AtomicBool::new(false));
        fx.signal.raise();

        let handle = spawn_ingestion_thread(fx.worker, rx, Arc::clone(&stop));
        let deadline = Instant::now() + Duration::from_secs(5);
        while fx.signal.is_raised() || fx.store.read_daily()?.day_count == 0 {
            if Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        stop.store(true, Ordering::Relaxed);
        handle.join().map_err(|_| "worker thread panicked")?;
        drop(tx);

        let daily = fx.store.read_daily()?;
        assert_eq!(daily.day_count, 1);
        assert_eq!(daily.buckets, vec![0.0; 7]);
        assert_eq!(
            fx.store.read_weekly()?,
            vec![WeeklyRow::new(date!(2026 - 03 - 02), 0)]
        );
        Ok(())
    }
}
