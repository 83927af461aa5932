//! devdash-server: REST API over MySQL and PostgreSQL
//!
//! MySQL holds the commerce data (users, products, orders); PostgreSQL holds
//! analytics events and performance metrics. Notes live in either, both, or
//! memory depending on `server.notes_backend`.
//!
//! A database that is unreachable at startup does not stop the server: its
//! pool is created lazily and the affected routes answer with errors until
//! it comes back, while `/health` reports the service as degraded. Skipped
//! migrations run on the first `/health` probe that finds the database up.

pub mod db;
pub mod http;
pub mod notes;

use devdash_core::DashConfig;

pub use db::DbError;
pub use http::{create_router, run_server, AppState, ServerConfig, ServerError};

/// Connect configured databases, run migrations and pick the notes store.
pub async fn build_state(config: &DashConfig) -> Result<AppState, ServerError> {
    let mut mysql_pending = false;
    let mut pg_pending = false;

    let mysql = match config.mysql.as_ref() {
        Some(cfg) => {
            let pool = db::create_mysql_pool(cfg).await?;
            if cfg.run_migrations {
                mysql_pending = !migrate(db::migrations::run_mysql(&pool).await, "mysql");
            }
            Some(pool)
        }
        None => {
            tracing::info!("mysql not configured; user, product and order routes disabled");
            None
        }
    };

    let postgres = match config.postgresql.as_ref() {
        Some(cfg) => {
            let pool = db::create_pg_pool(cfg).await?;
            if cfg.run_migrations {
                pg_pending = !migrate(db::migrations::run_pg(&pool).await, "postgresql");
            }
            Some(pool)
        }
        None => {
            tracing::info!("postgresql not configured; analytics and metric routes disabled");
            None
        }
    };

    let notes = match notes::build_store(config.server.notes_backend, postgres.as_ref(), mysql.as_ref()) {
        Ok(store) => Some(store),
        Err(DbError::Unavailable(service)) => {
            tracing::warn!(
                backend = %config.server.notes_backend,
                missing = service,
                "notes backend needs an unconfigured database; notes routes disabled"
            );
            None
        }
        Err(e) => return Err(e.into()),
    };

    let state = AppState::new(mysql, postgres, notes).with_pending_migrations(mysql_pending, pg_pending);
    if !mysql_pending && !pg_pending {
        state.sync_user_mirror().await;
    }
    Ok(state)
}

/// Log a migration outcome; true when the schema is in place.
fn migrate(outcome: Result<(), sqlx::Error>, name: &str) -> bool {
    match outcome {
        Ok(()) => {
            tracing::info!(database = name, "schema up to date");
            true
        }
        Err(e) => {
            tracing::warn!(database = name, error = %e, "migrations deferred until the database answers");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::{DatabaseConfig, NotesBackend};

    #[tokio::test]
    async fn empty_config_builds_bare_state() {
        let state = build_state(&DashConfig::default()).await.unwrap();
        assert!(state.mysql.is_none());
        assert!(state.postgres.is_none());
        // default backend is postgres, which is not configured
        assert!(state.notes.is_none());
    }

    #[tokio::test]
    async fn memory_notes_need_no_database() {
        let mut config = DashConfig::default();
        config.server.notes_backend = NotesBackend::Memory;
        let state = build_state(&config).await.unwrap();
        assert_eq!(state.notes().map(|n| n.backend()).ok(), Some("memory"));
    }

    #[tokio::test]
    async fn unreachable_database_still_builds() {
        let mut config = DashConfig::default();
        let mut mysql = DatabaseConfig::new("mysql://nobody@127.0.0.1:1/devdash");
        mysql.connect_timeout_secs = 1;
        config.mysql = Some(mysql);
        config.server.notes_backend = NotesBackend::Mysql;
        let state = build_state(&config).await.unwrap();
        assert!(state.mysql.is_some());
        assert_eq!(state.notes().map(|n| n.backend()).ok(), Some("mysql"));
        assert!(state.migrations_pending(devdash_core::DbKind::Mysql));
    }
}
