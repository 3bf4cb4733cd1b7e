use crate::cycle::{CyclePhase, RolloverReason};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CurrentSuccessResponse {
    pub occupancy: u32,
    pub queue_length: u32,
    pub estimated_queue_time_minutes: f64,
    /// Not persisted, so absent when served from the stored snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_occupancy_today: Option<u32>,
    pub phase: CyclePhase,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CurrentErrorResponse {
    pub error_code: CurrentErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DayPeakResponse {
    pub date: String,
    pub weekday: String,
    pub peak_occupancy: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct IntervalAverageResponse {
    pub start: String,
    pub average_occupancy: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FullSuccessResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentSuccessResponse>,
    pub max_per_day: Vec<DayPeakResponse>,
    pub max_per_interval: Vec<IntervalAverageResponse>,
    pub day_count: u64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FullErrorResponse {
    pub error_code: FullErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RolloverStatusResponse {
    pub closing_date: String,
    pub reason: RolloverReason,
    pub finished_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub phase: CyclePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rollover: Option<RolloverStatusResponse>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthErrorResponse {
    pub error_code: HealthErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurrentErrorCode {
    NoData,
    InternalError,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FullErrorCode {
    InternalError,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthErrorCode {
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_response_omits_peak_when_none() {
        let response = CurrentSuccessResponse {
            occupancy: 12,
            queue_length: 4,
            estimated_queue_time_minutes: 2.5,
            max_occupancy_today: None,
            phase: CyclePhase::Running,
            timestamp: "2026-03-02T12:30:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize current response");
        assert_eq!(
            value,
            json!({
                "occupancy": 12,
                "queue_length": 4,
                "estimated_queue_time_minutes": 2.5,
                "phase": "running",
                "timestamp": "2026-03-02T12:30:00Z"
            })
        );
    }

    #[test]
    fn error_response_uses_screaming_snake_case_code() {
        let response = CurrentErrorResponse {
            error_code: CurrentErrorCode::NoData,
            error_message: "No occupancy data available".to_string(),
            timestamp: "2026-03-02T12:30:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize error response");
        assert_eq!(value["error_code"], "NO_DATA");
    }

    #[test]
    fn full_response_lists_days_and_intervals() {
        let response = FullSuccessResponse {
            current: None,
            max_per_day: vec![DayPeakResponse {
                date: "2026-03-02".to_string(),
                weekday: "monday".to_string(),
                peak_occupancy: 85,
            }],
            max_per_interval: vec![IntervalAverageResponse {
                start: "11:00".to_string(),
                average_occupancy: 12.5,
            }],
            day_count: 4,
            timestamp: "2026-03-03T09:00:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize full response");
        assert_eq!(
            value,
            json!({
                "max_per_day": [
                    {"date": "2026-03-02", "weekday": "monday", "peak_occupancy": 85}
                ],
                "max_per_interval": [
                    {"start": "11:00", "average_occupancy": 12.5}
                ],
                "day_count": 4,
                "timestamp": "2026-03-03T09:00:00Z"
            })
        );
    }

    #[test]
    fn health_response_reports_failed_rollover() {
        let response = HealthSuccessResponse {
            status: HealthStatus::Degraded,
            phase: CyclePhase::Running,
            last_rollover: Some(RolloverStatusResponse {
                closing_date: "2026-03-02".to_string(),
                reason: RolloverReason::EndOfStream,
                finished_at: "2026-03-02T14:05:00Z".to_string(),
                error: Some("failed to read daily summary".to_string()),
            }),
            timestamp: "2026-03-02T14:06:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize health response");
        assert_eq!(value["status"], "degraded");
        assert_eq!(value["last_rollover"]["reason"], "end_of_stream");
    }
}
