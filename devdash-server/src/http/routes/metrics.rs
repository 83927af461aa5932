//! Performance metric endpoints (PostgreSQL)

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use devdash_core::models::{MetricQuery, MetricSource, PerformanceMetric, RecordMetricsBody};
use serde::Deserialize;

use crate::db::repos::MetricRepo;
use crate::http::error::ApiError;
use crate::http::extractors::{ValidJson, ValidQuery};
use crate::http::response::ApiResponse;
use crate::http::server::AppState;

#[derive(Debug, Default, Deserialize)]
struct LatestQuery {
    source: Option<String>,
}

async fn list_metrics(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<MetricQuery>,
) -> Result<ApiResponse<Vec<PerformanceMetric>>, ApiError> {
    let filter = query.into_filter()?;
    let metrics = MetricRepo::new(state.postgres()?).list(&filter).await?;
    Ok(ApiResponse::ok(metrics))
}

/// POST /metrics - one metric or `{ "metrics": [...] }`
async fn record_metrics(
    State(state): State<Arc<AppState>>,
    ValidJson(body): ValidJson<RecordMetricsBody>,
) -> Result<(StatusCode, ApiResponse<Vec<PerformanceMetric>>), ApiError> {
    let metrics = body.validate()?;
    let stored = MetricRepo::new(state.postgres()?).record(metrics).await?;
    let message = format!("{} metric(s) recorded", stored.len());
    Ok((StatusCode::CREATED, ApiResponse::ok(stored).with_message(message)))
}

async fn latest_metrics(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<LatestQuery>,
) -> Result<ApiResponse<Vec<PerformanceMetric>>, ApiError> {
    let source = query
        .source
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<MetricSource>)
        .transpose()?;
    let metrics = MetricRepo::new(state.postgres()?).latest(source).await?;
    Ok(ApiResponse::ok(metrics))
}

/// Metric routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/metrics", get(list_metrics).post(record_metrics))
        .route("/metrics/latest", get(latest_metrics))
}
