//! Database connection pool management
//!
//! One sqlx pool per engine, sized from config. When the database is
//! unreachable at startup the pool is created lazily instead, so the server
//! still comes up and `/api/health` reports the outage.

use std::time::Duration;

use devdash_core::DatabaseConfig;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::{MySqlPool, PgPool};

/// Create a PostgreSQL connection pool.
///
/// # Example
///
/// ```ignore
/// let pool = create_pg_pool(&DatabaseConfig::new("postgres://localhost/devops_analytics")).await?;
/// ```
pub async fn create_pg_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    match options.clone().connect(&config.url).await {
        Ok(pool) => Ok(pool),
        Err(e) => {
            tracing::warn!(error = %e, "PostgreSQL unreachable, continuing with a lazy pool");
            options.connect_lazy(&config.url)
        }
    }
}

/// Create a MySQL connection pool.
pub async fn create_mysql_pool(config: &DatabaseConfig) -> Result<MySqlPool, sqlx::Error> {
    let options = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    match options.clone().connect(&config.url).await {
        Ok(pool) => Ok(pool),
        Err(e) => {
            tracing::warn!(error = %e, "MySQL unreachable, continuing with a lazy pool");
            options.connect_lazy(&config.url)
        }
    }
}

/// Connect eagerly and fail if the database cannot be reached.
///
/// Operational commands use this; a lazy pool would only postpone the error.
pub async fn connect_pg_strict(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections.min(5))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await
}

/// MySQL counterpart of [`connect_pg_strict`].
pub async fn connect_mysql_strict(config: &DatabaseConfig) -> Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(config.max_connections.min(5))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p devdash-server -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pool_acquires_connection() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pg_pool(&DatabaseConfig::new(url))
            .await
            .expect("pool creation failed");

        let result: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");

        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn unreachable_database_yields_lazy_pool() {
        let mut config = DatabaseConfig::new("postgres://nobody@127.0.0.1:1/nothing");
        config.connect_timeout_secs = 1;
        let pool = create_pg_pool(&config).await.expect("lazy pool");
        assert!(sqlx::query("SELECT 1").execute(&pool).await.is_err());
    }
}
