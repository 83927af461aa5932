//! Performance metrics (PostgreSQL)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::analytics::{row_limit, window_hours};
use super::validation::{optional_text, required_text};
use super::ValidationError;

const MAX_NAME_LEN: usize = 100;
const MAX_UNIT_LEN: usize = 50;
pub const MAX_BATCH: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub id: i64,
    pub metric_name: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: Option<String>,
    pub source: MetricSource,
    pub tags: Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Gauge,
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    System,
    #[default]
    Application,
    Business,
}

string_enum!(MetricType, "metric_type", {
    Gauge => "gauge",
    Counter => "counter",
    Histogram => "histogram",
});

string_enum!(MetricSource, "source", {
    System => "system",
    Application => "application",
    Business => "business",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetricRequest {
    pub metric_name: String,
    pub metric_type: Option<MetricType>,
    pub value: f64,
    pub unit: Option<String>,
    pub source: Option<MetricSource>,
    pub tags: Option<Value>,
}

/// POST /api/metrics accepts either one metric or `{ "metrics": [...] }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecordMetricsBody {
    Batch { metrics: Vec<RecordMetricRequest> },
    Single(RecordMetricRequest),
}

#[derive(Debug, Clone)]
pub struct NewMetric {
    pub metric_name: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: Option<String>,
    pub source: MetricSource,
    pub tags: Value,
}

impl RecordMetricRequest {
    pub fn validate(self) -> Result<NewMetric, ValidationError> {
        if !self.value.is_finite() {
            return Err(ValidationError::OutOfRange {
                field: "value",
                reason: "must be a finite number",
            });
        }
        let tags = match self.tags {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(obj @ Value::Object(_)) => obj,
            Some(_) => {
                return Err(ValidationError::InvalidFormat {
                    field: "tags",
                    reason: "must be a JSON object",
                })
            }
        };
        Ok(NewMetric {
            metric_name: required_text("metric_name", &self.metric_name, MAX_NAME_LEN)?,
            metric_type: self.metric_type.unwrap_or_default(),
            value: self.value,
            unit: optional_text("unit", self.unit.as_deref(), MAX_UNIT_LEN)?,
            source: self.source.unwrap_or_default(),
            tags,
        })
    }
}

impl RecordMetricsBody {
    /// Validate every metric; one bad entry rejects the whole batch.
    pub fn validate(self) -> Result<Vec<NewMetric>, ValidationError> {
        let raw = match self {
            Self::Batch { metrics } => metrics,
            Self::Single(metric) => vec![metric],
        };
        if raw.is_empty() {
            return Err(ValidationError::Empty { field: "metrics" });
        }
        if raw.len() > MAX_BATCH {
            return Err(ValidationError::TooMany {
                field: "metrics",
                max: MAX_BATCH,
            });
        }
        raw.into_iter().map(RecordMetricRequest::validate).collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricQuery {
    pub name: Option<String>,
    pub source: Option<String>,
    pub since_hours: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFilter {
    pub name: Option<String>,
    pub source: Option<MetricSource>,
    pub since_hours: u32,
    pub limit: u32,
}

impl MetricQuery {
    pub fn into_filter(self) -> Result<MetricFilter, ValidationError> {
        Ok(MetricFilter {
            name: self.name.filter(|n| !n.trim().is_empty()),
            source: self
                .source
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .transpose()?,
            since_hours: window_hours(self.since_hours),
            limit: row_limit(self.limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_and_batch_bodies() {
        let single: RecordMetricsBody =
            serde_json::from_value(json!({"metric_name": "cpu_usage", "value": 42.5})).unwrap();
        assert_eq!(single.validate().unwrap().len(), 1);

        let batch: RecordMetricsBody = serde_json::from_value(json!({
            "metrics": [
                {"metric_name": "cpu_usage", "value": 42.5, "source": "system", "unit": "percent"},
                {"metric_name": "request_count", "metric_type": "counter", "value": 17}
            ]
        }))
        .unwrap();
        let metrics = batch.validate().unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].source, MetricSource::System);
        assert_eq!(metrics[1].metric_type, MetricType::Counter);
        assert_eq!(metrics[1].source, MetricSource::Application);
    }

    #[test]
    fn empty_batch_rejected() {
        let body: RecordMetricsBody = serde_json::from_value(json!({"metrics": []})).unwrap();
        assert!(matches!(body.validate(), Err(ValidationError::Empty { .. })));
    }

    #[test]
    fn rejects_array_tags() {
        let req = RecordMetricRequest {
            metric_name: "x".into(),
            metric_type: None,
            value: 1.0,
            unit: None,
            source: None,
            tags: Some(json!(["a"])),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn query_parses_source() {
        let filter = MetricQuery {
            source: Some("business".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.source, Some(MetricSource::Business));
        assert_eq!(filter.since_hours, 24);

        assert!(MetricQuery {
            source: Some("kernel".into()),
            ..Default::default()
        }
        .into_filter()
        .is_err());
    }
}
