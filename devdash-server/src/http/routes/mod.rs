//! Route definitions
//!
//! Each module exposes `router()`; everything except health is nested
//! under `/api`.

pub mod analytics;
pub mod dashboard;
pub mod health;
pub mod metrics;
pub mod notes;
pub mod orders;
pub mod products;
pub mod users;

use std::sync::Arc;

use axum::Router;

use super::server::AppState;

/// All `/api` routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(users::router())
        .merge(products::router())
        .merge(orders::router())
        .merge(analytics::router())
        .merge(metrics::router())
        .merge(dashboard::router())
        .merge(notes::router())
}
