//! Analytics events (PostgreSQL)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validation::{optional_text, required_text};
use super::ValidationError;

const MAX_SESSION_LEN: usize = 100;
const MAX_EVENT_TYPE_LEN: usize = 50;
const MAX_SHORT_LEN: usize = 100;
const MAX_URL_LEN: usize = 2_048;

pub const DEFAULT_WINDOW_HOURS: u32 = 24;
pub const MAX_WINDOW_HOURS: u32 = 24 * 30;
pub const DEFAULT_EVENT_LIMIT: u32 = 100;
pub const MAX_EVENT_LIMIT: u32 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: i64,
    pub session_id: String,
    pub user_id: Option<i64>,
    pub event_type: String,
    pub event_name: Option<String>,
    pub page_url: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub operating_system: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub event_data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackEventRequest {
    pub session_id: String,
    pub user_id: Option<i64>,
    pub event_type: String,
    pub event_name: Option<String>,
    pub page_url: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub operating_system: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub event_data: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub session_id: String,
    pub user_id: Option<i64>,
    pub event_type: String,
    pub event_name: Option<String>,
    pub page_url: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub operating_system: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub event_data: Value,
}

impl TrackEventRequest {
    pub fn validate(self) -> Result<NewEvent, ValidationError> {
        let event_data = match self.event_data {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(obj @ Value::Object(_)) => obj,
            Some(_) => {
                return Err(ValidationError::InvalidFormat {
                    field: "event_data",
                    reason: "must be a JSON object",
                })
            }
        };

        Ok(NewEvent {
            session_id: required_text("session_id", &self.session_id, MAX_SESSION_LEN)?,
            user_id: self.user_id,
            event_type: required_text("event_type", &self.event_type, MAX_EVENT_TYPE_LEN)?,
            event_name: optional_text("event_name", self.event_name.as_deref(), MAX_SHORT_LEN)?,
            page_url: optional_text("page_url", self.page_url.as_deref(), MAX_URL_LEN)?,
            device_type: optional_text("device_type", self.device_type.as_deref(), MAX_SHORT_LEN)?,
            browser: optional_text("browser", self.browser.as_deref(), MAX_SHORT_LEN)?,
            operating_system: optional_text(
                "operating_system",
                self.operating_system.as_deref(),
                MAX_SHORT_LEN,
            )?,
            country: optional_text("country", self.country.as_deref(), MAX_SHORT_LEN)?,
            city: optional_text("city", self.city.as_deref(), MAX_SHORT_LEN)?,
            event_data,
        })
    }
}

/// Clamp a time window in hours to 1..=720, defaulting to 24.
pub fn window_hours(hours: Option<u32>) -> u32 {
    hours.unwrap_or(DEFAULT_WINDOW_HOURS).clamp(1, MAX_WINDOW_HOURS)
}

/// Clamp a row limit to 1..=1000, defaulting to 100.
pub fn row_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, MAX_EVENT_LIMIT)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub event_type: Option<String>,
    pub since_hours: Option<u32>,
    pub limit: Option<u32>,
    /// Only used by the summary endpoint
    pub hours: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub since_hours: u32,
    pub limit: u32,
}

impl From<EventQuery> for EventFilter {
    fn from(q: EventQuery) -> Self {
        Self {
            event_type: q.event_type.filter(|t| !t.trim().is_empty()),
            since_hours: window_hours(q.since_hours.or(q.hours)),
            limit: row_limit(q.limit),
        }
    }
}

/// Grouped count used by summaries and the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBucket {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub window_hours: u32,
    pub total_events: i64,
    pub unique_sessions: i64,
    pub by_event_type: Vec<CountBucket>,
    pub by_device_type: Vec<CountBucket>,
    pub by_country: Vec<CountBucket>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn click() -> TrackEventRequest {
        TrackEventRequest {
            session_id: "sess_1234567".into(),
            event_type: "click".into(),
            page_url: Some("/dashboard".into()),
            event_data: Some(json!({"element": "chart", "position": {"x": 10, "y": 20}})),
            ..Default::default()
        }
    }

    #[test]
    fn validates_event() {
        let event = click().validate().unwrap();
        assert_eq!(event.event_type, "click");
        assert_eq!(event.event_data["position"]["x"], 10);
    }

    #[test]
    fn missing_event_data_becomes_empty_object() {
        let event = TrackEventRequest {
            event_data: None,
            ..click()
        }
        .validate()
        .unwrap();
        assert_eq!(event.event_data, json!({}));
    }

    #[test]
    fn rejects_non_object_event_data() {
        let err = TrackEventRequest {
            event_data: Some(json!([1, 2])),
            ..click()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { field: "event_data", .. }));
    }

    #[test]
    fn window_and_limit_clamps() {
        assert_eq!(window_hours(None), 24);
        assert_eq!(window_hours(Some(0)), 1);
        assert_eq!(window_hours(Some(10_000)), 720);
        assert_eq!(row_limit(Some(5_000)), 1_000);
    }
}
