//! Analytics endpoints (PostgreSQL)

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use devdash_core::models::analytics::window_hours;
use devdash_core::models::{AnalyticsEvent, AnalyticsSummary, EventFilter, EventQuery, TrackEventRequest};

use crate::db::repos::AnalyticsRepo;
use crate::http::error::ApiError;
use crate::http::extractors::{ValidJson, ValidQuery};
use crate::http::response::ApiResponse;
use crate::http::server::AppState;

async fn list_events(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<EventQuery>,
) -> Result<ApiResponse<Vec<AnalyticsEvent>>, ApiError> {
    let filter = EventFilter::from(query);
    let events = AnalyticsRepo::new(state.postgres()?).list(&filter).await?;
    Ok(ApiResponse::ok(events))
}

async fn track_event(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<TrackEventRequest>,
) -> Result<(StatusCode, ApiResponse<AnalyticsEvent>), ApiError> {
    let event = AnalyticsRepo::new(state.postgres()?).track(req.validate()?).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(event)))
}

/// GET /analytics/summary?hours=N
async fn summary(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<EventQuery>,
) -> Result<ApiResponse<AnalyticsSummary>, ApiError> {
    let hours = window_hours(query.hours.or(query.since_hours));
    let summary = AnalyticsRepo::new(state.postgres()?).summary(hours).await?;
    Ok(ApiResponse::ok(summary))
}

/// Analytics routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/events", get(list_events).post(track_event))
        .route("/analytics/summary", get(summary))
}
