//! Dashboard aggregate endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use devdash_core::models::DashboardMetrics;

use crate::db::repos::DashboardRepo;
use crate::http::response::ApiResponse;
use crate::http::server::AppState;

/// GET /dashboard, GET /dashboard/metrics
///
/// Never fails: sections whose database is missing or down are omitted and
/// flagged in `sources`.
async fn dashboard(State(state): State<Arc<AppState>>) -> ApiResponse<DashboardMetrics> {
    let metrics = DashboardRepo::new(state.mysql.as_ref(), state.postgres.as_ref())
        .collect()
        .await;
    ApiResponse::ok(metrics)
}

/// Dashboard routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/dashboard/metrics", get(dashboard))
}
