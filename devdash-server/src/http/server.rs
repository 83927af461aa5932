//! Axum server setup
//!
//! Server skeleton with:
//! - Localhost-only CORS by default
//! - Tracing middleware and a request timeout
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderValue;
use axum::Router;
use devdash_core::config::ServerSettings;
use devdash_core::DbKind;
use sqlx::{MySqlPool, PgPool};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::routes;
use crate::db::migrations;
use crate::db::repos::UserMirror;
use crate::notes::NoteStore;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:3000)
    pub bind_addr: SocketAddr,

    /// Allow permissive CORS (default: false = localhost only)
    ///
    /// WARNING: Setting this to true allows any origin.
    pub cors_permissive: bool,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            cors_permissive: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Result<Self, ServerError> {
        let bind_addr = settings
            .bind
            .parse()
            .map_err(|_| ServerError::InvalidBind(settings.bind.clone()))?;
        Ok(Self {
            bind_addr,
            cors_permissive: settings.cors_permissive,
            request_timeout: Duration::from_secs(settings.request_timeout_secs.max(1)),
        })
    }
}

/// Shared application state
pub struct AppState {
    pub mysql: Option<MySqlPool>,
    pub postgres: Option<PgPool>,
    pub notes: Option<Arc<dyn NoteStore>>,
    pub started_at: Instant,
    mysql_schema_pending: AtomicBool,
    pg_schema_pending: AtomicBool,
}

impl AppState {
    pub fn new(mysql: Option<MySqlPool>, postgres: Option<PgPool>, notes: Option<Arc<dyn NoteStore>>) -> Self {
        Self {
            mysql,
            postgres,
            notes,
            started_at: Instant::now(),
            mysql_schema_pending: AtomicBool::new(false),
            pg_schema_pending: AtomicBool::new(false),
        }
    }

    /// Mark migrations that could not run at startup.
    pub fn with_pending_migrations(self, mysql: bool, postgres: bool) -> Self {
        self.mysql_schema_pending.store(mysql, Ordering::SeqCst);
        self.pg_schema_pending.store(postgres, Ordering::SeqCst);
        self
    }

    pub fn migrations_pending(&self, kind: DbKind) -> bool {
        self.pending_flag(kind).load(Ordering::SeqCst)
    }

    fn pending_flag(&self, kind: DbKind) -> &AtomicBool {
        match kind {
            DbKind::Mysql => &self.mysql_schema_pending,
            DbKind::Postgresql => &self.pg_schema_pending,
        }
    }

    /// Run migrations skipped at startup, once the database answers.
    ///
    /// Concurrent callers race on the flag; only the winner migrates, and a
    /// failure re-arms it for the next probe.
    pub async fn retry_migrations(&self, kind: DbKind) {
        let flag = self.pending_flag(kind);
        if !flag.swap(false, Ordering::SeqCst) {
            return;
        }
        let outcome = match kind {
            DbKind::Mysql => match self.mysql.as_ref() {
                Some(pool) => migrations::run_mysql(pool).await,
                None => return,
            },
            DbKind::Postgresql => match self.postgres.as_ref() {
                Some(pool) => migrations::run_pg(pool).await,
                None => return,
            },
        };
        match outcome {
            Ok(()) => {
                tracing::info!(database = %kind, "deferred migrations applied");
                self.sync_user_mirror().await;
            }
            Err(e) => {
                tracing::warn!(database = %kind, error = %e, "deferred migrations failed; will retry");
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Copy live MySQL users into the PostgreSQL mirror when both exist.
    pub async fn sync_user_mirror(&self) {
        if let (Some(mysql), Some(pg)) = (self.mysql.as_ref(), self.postgres.as_ref()) {
            if let Err(e) = UserMirror::new(pg).sync_from(mysql).await {
                tracing::warn!(error = %e, "user mirror sync failed");
            }
        }
    }

    pub fn mysql(&self) -> Result<&MySqlPool, ApiError> {
        self.mysql.as_ref().ok_or(ApiError::Unavailable { service: "mysql" })
    }

    pub fn postgres(&self) -> Result<&PgPool, ApiError> {
        self.postgres
            .as_ref()
            .ok_or(ApiError::Unavailable { service: "postgresql" })
    }

    pub fn notes(&self) -> Result<&dyn NoteStore, ApiError> {
        self.notes
            .as_deref()
            .ok_or(ApiError::Unavailable { service: "notes storage" })
    }
}

/// Build the application router.
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let cors = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        CorsLayer::permissive()
    } else {
        let port = config.bind_addr.port();
        let origins = ["localhost", "127.0.0.1"]
            .iter()
            .flat_map(|host| [format!("http://{}:{}", host, port), format!("http://{}:3000", host)])
            .filter_map(|origin| origin.parse::<HeaderValue>().ok())
            .collect::<Vec<_>>();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .merge(routes::health::router())
        .nest("/api", routes::api_router())
        .layer(cors)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server.
///
/// # Example
///
/// ```ignore
/// let state = build_state(&config).await?;
/// run_server(state, ServerConfig::from_settings(&config.server)?).await?;
/// ```
pub async fn run_server(state: AppState, config: ServerConfig) -> Result<(), ServerError> {
    let app = create_router(Arc::new(state), &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid bind address '{0}'")]
    InvalidBind(String),

    #[error("notes storage: {0}")]
    Notes(#[from] crate::db::DbError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(!config.cors_permissive);
    }

    #[test]
    fn config_from_settings() {
        let settings = ServerSettings {
            bind: "0.0.0.0:8080".into(),
            request_timeout_secs: 0,
            ..Default::default()
        };
        let config = ServerConfig::from_settings(&settings).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.request_timeout, Duration::from_secs(1));

        let bad = ServerSettings {
            bind: "not-an-addr".into(),
            ..Default::default()
        };
        assert!(matches!(
            ServerConfig::from_settings(&bad),
            Err(ServerError::InvalidBind(_))
        ));
    }

    #[tokio::test]
    async fn failed_retry_rearms_pending_migrations() {
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("mysql://nobody@127.0.0.1:1/nothing")
            .unwrap();
        let state = AppState::new(Some(pool), None, None).with_pending_migrations(true, false);
        assert!(state.migrations_pending(DbKind::Mysql));

        state.retry_migrations(DbKind::Mysql).await;
        assert!(state.migrations_pending(DbKind::Mysql));

        // nothing pending, nothing to do
        state.retry_migrations(DbKind::Postgresql).await;
        assert!(!state.migrations_pending(DbKind::Postgresql));
    }
}
