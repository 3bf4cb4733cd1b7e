//! Line-oriented sensor token stream feeding the ingestion worker.

use crate::clock::Clock;
use crate::counter::{Event, EventKind};
use crate::error::AppError;
use std::io::{BufRead, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use tracing::{debug, info, warn};

pub mod serial;

/// Events queued between the reader and the worker. Also absorbs arrivals while a
/// rollover is running.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceToken {
    Entry,
    QueueExit,
    OccupancyExit,
    EndOfStream,
}

impl SourceToken {
    /// Decodes one token; unknown input yields `None`.
    ///
    /// The `PORTn`/`EXIT` spellings are what the counting firmware prints.
    pub fn decode(raw: &str) -> Option<Self> {
        match raw.trim() {
            "ENTRY" | "PORT0" => Some(Self::Entry),
            "QUEUE_EXIT" | "PORT1" => Some(Self::QueueExit),
            "OCCUPANCY_EXIT" | "PORT2" => Some(Self::OccupancyExit),
            "END_OF_STREAM" | "EXIT" => Some(Self::EndOfStream),
            _ => None,
        }
    }

    pub fn event_kind(self) -> Option<EventKind> {
        match self {
            Self::Entry => Some(EventKind::Entry),
            Self::QueueExit => Some(EventKind::QueueExit),
            Self::OccupancyExit => Some(EventKind::OccupancyExit),
            Self::EndOfStream => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMessage {
    Event(Event),
    EndOfStream,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub events: usize,
    pub ignored: usize,
    /// End-of-stream tokens forwarded; each one closes a counting day.
    pub end_of_stream: usize,
}

/// Reads tokens until end of input, `stop`, or the worker hanging up. An
/// end-of-stream token is forwarded and reading carries on into the next day.
///
/// Read timeouts count as idle time. A line split across a timeout is kept and
/// completed by the next read.
pub fn read_tokens<R: BufRead>(
    mut reader: R,
    tx: &SyncSender<SourceMessage>,
    clock: &dyn Clock,
    stop: &AtomicBool,
) -> Result<ReadSummary, AppError> {
    let mut summary = ReadSummary::default();
    let mut line = Vec::with_capacity(32);

    while !stop.load(Ordering::Relaxed) {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) if line.is_empty() => break,
            Ok(_) => {}
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(err) => return Err(AppError::Source(err.to_string())),
        }

        let raw = String::from_utf8_lossy(&line).trim().to_string();
        line.clear();
        let Some(token) = SourceToken::decode(&raw) else {
            if !raw.is_empty() {
                debug!(token = %raw, "Ignoring unrecognized token");
                summary.ignored += 1;
            }
            continue;
        };

        let message = match token.event_kind() {
            Some(kind) => SourceMessage::Event(Event::new(clock.now().time(), kind)),
            None => SourceMessage::EndOfStream,
        };
        if tx.send(message).is_err() {
            warn!("Ingestion worker gone, stopping reader");
            break;
        }
        match message {
            SourceMessage::Event(_) => summary.events += 1,
            SourceMessage::EndOfStream => {
                info!("End of stream received, day handed to the worker");
                summary.end_of_stream += 1;
            }
        }
    }

    Ok(summary)
}

pub fn spawn_reader_thread<R>(
    reader: R,
    tx: SyncSender<SourceMessage>,
    clock: Arc<dyn Clock>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || match read_tokens(reader, &tx, clock.as_ref(), &stop) {
        Ok(summary) => info!(
            events = summary.events,
            ignored = summary.ignored,
            end_of_stream = summary.end_of_stream,
            "Event source finished"
        ),
        Err(err) => warn!(error = %err, "Event source failed"),
    })
}
