use crate::aggregate::WeeklyAggregator;
use crate::api::ApiContext;
use crate::api::responses::{
    CurrentErrorCode, CurrentErrorResponse, CurrentSuccessResponse, DayPeakResponse,
    FullErrorCode, FullErrorResponse, FullSuccessResponse, HealthErrorCode, HealthErrorResponse,
    HealthStatus, HealthSuccessResponse, IntervalAverageResponse, RolloverStatusResponse,
};
use crate::state::RolloverRecord;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum CurrentResponse {
    Success(CurrentSuccessResponse),
    Error {
        status: StatusCode,
        body: CurrentErrorResponse,
    },
}

impl IntoResponse for CurrentResponse {
    fn into_response(self) -> Response {
        match self {
            CurrentResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            CurrentResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_current(State(context): State<ApiContext>) -> impl IntoResponse {
    let now = context.clock.now();
    // The stored snapshot fallback is a file read.
    tokio::task::spawn_blocking(move || build_current_response(&context, now))
        .await
        .unwrap_or_else(|err| {
            error!(error = %err, "Current snapshot task failed");
            current_internal_error("current snapshot task failed", now)
        })
}

pub enum FullResponse {
    Success(FullSuccessResponse),
    Error {
        status: StatusCode,
        body: FullErrorResponse,
    },
}

impl IntoResponse for FullResponse {
    fn into_response(self) -> Response {
        match self {
            FullResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            FullResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_full(State(context): State<ApiContext>) -> impl IntoResponse {
    let now = context.clock.now();
    tokio::task::spawn_blocking(move || build_full_response(&context, now))
        .await
        .unwrap_or_else(|err| {
            error!(error = %err, "Summary read task failed");
            full_internal_error("summary read task failed", now)
        })
}

pub enum HealthResponse {
    Success(HealthSuccessResponse),
    Error {
        status: StatusCode,
        body: HealthErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(context): State<ApiContext>) -> impl IntoResponse {
    let now = context.clock.now();
    build_health_response(&context, now)
}

enum CurrentLookup {
    Found(CurrentSuccessResponse),
    Missing,
    Failed(&'static str),
}

/// Live snapshot once the worker published one, else the last persisted snapshot.
fn lookup_current(context: &ApiContext, now: OffsetDateTime) -> CurrentLookup {
    let (snapshot, snapshot_at, phase) = match context.state.read() {
        Ok(guard) => (*guard.snapshot(), guard.snapshot_at(), guard.phase()),
        Err(_) => return CurrentLookup::Failed("state lock poisoned while reading snapshot"),
    };

    if let Some(at) = snapshot_at {
        let Ok(timestamp) = format_timestamp(at) else {
            return CurrentLookup::Failed("timestamp formatting failure");
        };
        return CurrentLookup::Found(CurrentSuccessResponse {
            occupancy: snapshot.occupancy,
            queue_length: snapshot.queue_length,
            estimated_queue_time_minutes: snapshot.estimated_queue_time_minutes,
            max_occupancy_today: Some(snapshot.max_occupancy_today),
            phase,
            timestamp,
        });
    }

    match context.store.read_snapshot() {
        Ok(Some(values)) => match format_timestamp(now) {
            Ok(timestamp) => CurrentLookup::Found(CurrentSuccessResponse {
                occupancy: values.occupancy,
                queue_length: values.queue_length,
                estimated_queue_time_minutes: values.estimated_queue_time_minutes,
                max_occupancy_today: None,
                phase,
                timestamp,
            }),
            Err(_) => CurrentLookup::Failed("timestamp formatting failure"),
        },
        Ok(None) => CurrentLookup::Missing,
        Err(err) => {
            error!(error = %err, "Failed to read stored snapshot");
            CurrentLookup::Failed("stored snapshot unreadable")
        }
    }
}

fn build_current_response(context: &ApiContext, now: OffsetDateTime) -> CurrentResponse {
    match lookup_current(context, now) {
        CurrentLookup::Found(body) => CurrentResponse::Success(body),
        CurrentLookup::Missing => match format_timestamp(now) {
            Ok(timestamp) => CurrentResponse::Error {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: CurrentErrorResponse {
                    error_code: CurrentErrorCode::NoData,
                    error_message: "No occupancy data available".to_string(),
                    timestamp,
                },
            },
            Err(_) => current_internal_error("timestamp formatting failure", now),
        },
        CurrentLookup::Failed(message) => current_internal_error(message, now),
    }
}

fn current_internal_error(message: &str, now: OffsetDateTime) -> CurrentResponse {
    error!(
        message = message,
        "Internal error while handling /api/current"
    );
    CurrentResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: CurrentErrorResponse {
            error_code: CurrentErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(now),
        },
    }
}

fn build_full_response(context: &ApiContext, now: OffsetDateTime) -> FullResponse {
    let current = match lookup_current(context, now) {
        CurrentLookup::Found(body) => Some(body),
        CurrentLookup::Missing => None,
        CurrentLookup::Failed(message) => return full_internal_error(message, now),
    };

    let daily = match context.store.read_daily() {
        Ok(daily) => daily,
        Err(err) => {
            error!(error = %err, "Failed to read daily summary");
            return full_internal_error("daily summary unreadable", now);
        }
    };
    let weekly = match context.store.read_weekly() {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, "Failed to read weekly summary");
            return full_internal_error("weekly summary unreadable", now);
        }
    };

    let today = context.clock.local().date();
    let max_per_day = WeeklyAggregator::current_week(&weekly, today)
        .into_iter()
        .map(|row| DayPeakResponse {
            date: row.date.to_string(),
            weekday: row.weekday,
            peak_occupancy: row.peak_occupancy,
        })
        .collect();
    let max_per_interval = context
        .window
        .bucket_labels()
        .into_iter()
        .zip(daily.buckets.iter())
        .map(|(start, average)| IntervalAverageResponse {
            start,
            average_occupancy: *average,
        })
        .collect();

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return full_internal_error("timestamp formatting failure", now),
    };

    FullResponse::Success(FullSuccessResponse {
        current,
        max_per_day,
        max_per_interval,
        day_count: daily.day_count,
        timestamp,
    })
}

fn full_internal_error(message: &str, now: OffsetDateTime) -> FullResponse {
    error!(message = message, "Internal error while handling /api/full");
    FullResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: FullErrorResponse {
            error_code: FullErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(now),
        },
    }
}

fn build_health_response(context: &ApiContext, now: OffsetDateTime) -> HealthResponse {
    let (phase, last_rollover) = match context.state.read() {
        Ok(guard) => (guard.phase(), guard.last_rollover().cloned()),
        Err(_) => {
            return health_internal_error("state lock poisoned while reading phase", now);
        }
    };

    let status = match &last_rollover {
        Some(record) if !record.succeeded() => HealthStatus::Degraded,
        _ => HealthStatus::Ok,
    };
    let last_rollover = match last_rollover.map(map_rollover_record).transpose() {
        Ok(mapped) => mapped,
        Err(_) => return health_internal_error("timestamp formatting failure", now),
    };
    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return health_internal_error("timestamp formatting failure", now),
    };

    HealthResponse::Success(HealthSuccessResponse {
        status,
        phase,
        last_rollover,
        timestamp,
    })
}

fn map_rollover_record(record: RolloverRecord) -> Result<RolloverStatusResponse, TimestampError> {
    Ok(RolloverStatusResponse {
        closing_date: record.closing_date.to_string(),
        reason: record.reason,
        finished_at: format_timestamp(record.finished_at)?,
        error: record.error,
    })
}

fn health_internal_error(message: &str, now: OffsetDateTime) -> HealthResponse {
    error!(
        message = message,
        "Internal error while handling /api/health"
    );
    HealthResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: HealthErrorResponse {
            error_code: HealthErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(now),
        },
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, TimestampError> {
    timestamp.format(&Rfc3339).map_err(TimestampError::Format)
}

fn fallback_timestamp(now: OffsetDateTime) -> String {
    format_timestamp(now).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format error timestamp");
        EPOCH_TIMESTAMP.to_string()
    })
}
