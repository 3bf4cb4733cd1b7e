use crate::counter::Snapshot;
use crate::cycle::{CyclePhase, RolloverReason};
use time::{Date, OffsetDateTime};
use tokio::sync::watch;

/// Outcome of the most recent day-boundary rollover.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloverRecord {
    pub closing_date: Date,
    pub reason: RolloverReason,
    pub finished_at: OffsetDateTime,
    pub error: Option<String>,
}

impl RolloverRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Read side of the ingestion worker. The worker is the only writer.
#[derive(Debug)]
pub struct AppState {
    snapshot: Snapshot,
    snapshot_at: Option<OffsetDateTime>,
    snapshot_tx: watch::Sender<Snapshot>,
    phase: CyclePhase,
    phase_tx: watch::Sender<CyclePhase>,
    last_rollover: Option<RolloverRecord>,
}

impl AppState {
    pub fn new() -> Self {
        let (snapshot_tx, _snapshot_rx) = watch::channel(Snapshot::default());
        let (phase_tx, _phase_rx) = watch::channel(CyclePhase::Running);
        Self {
            snapshot: Snapshot::default(),
            snapshot_at: None,
            snapshot_tx,
            phase: CyclePhase::Running,
            phase_tx,
            last_rollover: None,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// `None` until the first event of the process lifetime was applied.
    pub fn snapshot_at(&self) -> Option<OffsetDateTime> {
        self.snapshot_at
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn set_snapshot(&mut self, snapshot: Snapshot, at: OffsetDateTime) {
        self.snapshot = snapshot;
        self.snapshot_at = Some(at);
        self.snapshot_tx.send_replace(snapshot);
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase_tx.subscribe()
    }

    pub fn set_phase(&mut self, phase: CyclePhase) {
        self.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    pub fn last_rollover(&self) -> Option<&RolloverRecord> {
        self.last_rollover.as_ref()
    }

    pub fn set_last_rollover(&mut self, record: RolloverRecord) {
        self.last_rollover = Some(record);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn set_snapshot_updates_state_and_watch() {
        let mut state = AppState::new();
        let receiver = state.subscribe_snapshot();
        let snapshot = Snapshot {
            occupancy: 42,
            queue_length: 7,
            max_occupancy_today: 50,
            estimated_queue_time_minutes: 3.5,
        };

        state.set_snapshot(snapshot, datetime!(2026-03-02 12:00 UTC));

        assert_eq!(state.snapshot(), &snapshot);
        assert_eq!(state.snapshot_at(), Some(datetime!(2026-03-02 12:00 UTC)));
        assert_eq!(*receiver.borrow(), snapshot);
    }

    #[test]
    fn set_phase_without_subscribers_does_not_fail() {
        let mut state = AppState::new();

        state.set_phase(CyclePhase::Rolling);

        assert_eq!(state.phase(), CyclePhase::Rolling);
        assert_eq!(*state.subscribe_phase().borrow(), CyclePhase::Rolling);
    }

    #[test]
    fn last_rollover_reports_failure() {
        let mut state = AppState::new();
        state.set_last_rollover(RolloverRecord {
            closing_date: date!(2026 - 03 - 02),
            reason: RolloverReason::Scheduled,
            finished_at: datetime!(2026-03-03 00:00 UTC),
            error: Some("daily summary missing".to_string()),
        });

        let record = state.last_rollover().expect("record stored");
        assert!(!record.succeeded());
    }
}
