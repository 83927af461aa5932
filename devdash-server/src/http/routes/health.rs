//! Health check endpoint
//!
//! Probes each configured database with `SELECT 1`. Any configured database
//! that does not answer makes the service `degraded` and the response 503,
//! which is what load balancer health checks key on. A database that
//! answers for the first time after a failed startup gets its migrations
//! applied here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use devdash_core::DbKind;
use serde::Serialize;

use crate::http::server::AppState;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Up,
    Down,
    NotConfigured,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Databases {
    pub mysql: DatabaseHealth,
    pub postgresql: DatabaseHealth,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub notes_backend: Option<&'static str>,
    pub databases: Databases,
}

impl DatabaseHealth {
    fn not_configured() -> Self {
        Self {
            status: ProbeStatus::NotConfigured,
            latency_ms: None,
            error: None,
        }
    }

    fn is_down(&self) -> bool {
        self.status == ProbeStatus::Down
    }
}

async fn probe<F, E>(query: F) -> DatabaseHealth
where
    F: std::future::Future<Output = Result<E, sqlx::Error>>,
{
    let started = Instant::now();
    let outcome = tokio::time::timeout(PROBE_TIMEOUT, query).await;
    let latency_ms = Some(started.elapsed().as_millis() as u64);
    match outcome {
        Ok(Ok(_)) => DatabaseHealth {
            status: ProbeStatus::Up,
            latency_ms,
            error: None,
        },
        Ok(Err(e)) => DatabaseHealth {
            status: ProbeStatus::Down,
            latency_ms,
            error: Some(e.to_string()),
        },
        Err(_) => DatabaseHealth {
            status: ProbeStatus::Down,
            latency_ms,
            error: Some(format!("no answer within {}s", PROBE_TIMEOUT.as_secs())),
        },
    }
}

/// GET /health, GET /api/health
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let mysql = async {
        match state.mysql.as_ref() {
            Some(pool) => probe(sqlx::query("SELECT 1").execute(pool)).await,
            None => DatabaseHealth::not_configured(),
        }
    };
    let postgresql = async {
        match state.postgres.as_ref() {
            Some(pool) => probe(sqlx::query("SELECT 1").execute(pool)).await,
            None => DatabaseHealth::not_configured(),
        }
    };
    let (mysql, postgresql) = tokio::join!(mysql, postgresql);

    if mysql.status == ProbeStatus::Up && state.migrations_pending(DbKind::Mysql) {
        state.retry_migrations(DbKind::Mysql).await;
    }
    if postgresql.status == ProbeStatus::Up && state.migrations_pending(DbKind::Postgresql) {
        state.retry_migrations(DbKind::Postgresql).await;
    }

    let degraded = mysql.is_down() || postgresql.is_down();
    let status = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = HealthResponse {
        success: !degraded,
        status: if degraded { "degraded" } else { "healthy" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
        notes_backend: state.notes.as_ref().map(|n| n.backend()),
        databases: Databases { mysql, postgresql },
    };
    (status, Json(body))
}

/// Health routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_databases_is_healthy() {
        let state = Arc::new(AppState::new(None, None, None));
        let (status, Json(body)) = health(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.databases.mysql.status, ProbeStatus::NotConfigured);
    }

    #[tokio::test]
    async fn unreachable_database_is_degraded() {
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("mysql://nobody@127.0.0.1:1/nothing")
            .unwrap();
        let state = Arc::new(AppState::new(Some(pool), None, None).with_pending_migrations(true, false));
        let (status, Json(body)) = health(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert!(body.databases.mysql.error.is_some());
        // still down, so the skipped migrations wait for the next probe
        assert!(state.migrations_pending(DbKind::Mysql));
    }
}
