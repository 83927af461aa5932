//! Database status and live monitoring
//!
//! For each configured database: reachability, round-trip latency, server
//! version, active connections, on-disk size and per-table row counts.
//! A database that cannot be reached is reported, not treated as fatal.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use devdash_core::{DashConfig, DatabaseConfig, DbKind};
use devdash_server::db::{connect_mysql_strict, connect_pg_strict};
use devdash_server::http::shutdown_signal;
use serde::Serialize;
use sqlx::{MySqlPool, PgPool};

use super::{print_json, OutputFormat, Target};

#[derive(Parser, Debug)]
pub struct MonitorArgs {
    #[command(subcommand)]
    pub command: MonitorCommands,
}

#[derive(Subcommand, Debug)]
pub enum MonitorCommands {
    /// One-shot status of each database
    Status(StatusArgs),
    /// Repeat status on an interval until Ctrl+C
    Watch(WatchArgs),
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(long, value_enum, default_value_t = Target::All)]
    pub target: Target,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub status: StatusArgs,

    /// Seconds between samples
    #[arg(long, default_value_t = 10)]
    pub interval: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbStatus {
    pub database: DbKind,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub version: Option<String>,
    pub active_connections: Option<i64>,
    pub size_bytes: Option<i64>,
    pub tables: Vec<TableCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl DbStatus {
    fn down(database: DbKind, error: impl ToString) -> Self {
        Self {
            database,
            reachable: false,
            latency_ms: None,
            version: None,
            active_connections: None,
            size_bytes: None,
            tables: Vec::new(),
            error: Some(error.to_string()),
            checked_at: Utc::now(),
        }
    }
}

pub async fn run_monitor(args: MonitorArgs, config: DashConfig) -> Result<()> {
    match args.command {
        MonitorCommands::Status(status) => {
            let report = collect(&config, status.target).await?;
            render(&report, status.format)?;
            if report.iter().any(|s| !s.reachable) {
                bail!("one or more databases are unreachable");
            }
            Ok(())
        }
        MonitorCommands::Watch(watch) => {
            let interval = Duration::from_secs(watch.interval.max(1));
            let mut ticker = tokio::time::interval(interval);
            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = collect(&config, watch.status.target).await?;
                        render(&report, watch.status.format)?;
                    }
                    _ = &mut shutdown => {
                        tracing::info!("monitor stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Probe every requested, configured database.
pub async fn collect(config: &DashConfig, target: Target) -> Result<Vec<DbStatus>> {
    let mut report = Vec::new();
    for kind in target.kinds() {
        let Some(db) = config.database(kind) else {
            if target != Target::All {
                bail!("{} is not configured", kind);
            }
            continue;
        };
        report.push(probe(kind, db).await);
    }
    if report.is_empty() {
        bail!("no databases configured");
    }
    Ok(report)
}

async fn probe(kind: DbKind, db: &DatabaseConfig) -> DbStatus {
    let result = match kind {
        DbKind::Mysql => match connect_mysql_strict(db).await {
            Ok(pool) => {
                let status = mysql_status(&pool).await;
                pool.close().await;
                status
            }
            Err(e) => Err(e),
        },
        DbKind::Postgresql => match connect_pg_strict(db).await {
            Ok(pool) => {
                let status = pg_status(&pool).await;
                pool.close().await;
                status
            }
            Err(e) => Err(e),
        },
    };
    result.unwrap_or_else(|e| {
        tracing::warn!(database = %kind, error = %e, "status probe failed");
        DbStatus::down(kind, e)
    })
}

async fn mysql_status(pool: &MySqlPool) -> Result<DbStatus, sqlx::Error> {
    let started = Instant::now();
    sqlx::query("SELECT 1").execute(pool).await?;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    let version: String = sqlx::query_scalar("SELECT CAST(VERSION() AS CHAR)").fetch_one(pool).await?;
    let active: i64 = sqlx::query_scalar("SELECT CAST(COUNT(*) AS SIGNED) FROM information_schema.PROCESSLIST")
        .fetch_one(pool)
        .await?;
    let size: i64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(SUM(DATA_LENGTH + INDEX_LENGTH), 0) AS SIGNED) \
         FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE()",
    )
    .fetch_one(pool)
    .await?;
    let tables: Vec<(String, i64)> = sqlx::query_as(
        "SELECT CAST(TABLE_NAME AS CHAR), CAST(COALESCE(TABLE_ROWS, 0) AS SIGNED) \
         FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
    )
    .fetch_all(pool)
    .await?;

    Ok(DbStatus {
        database: DbKind::Mysql,
        reachable: true,
        latency_ms: Some(latency_ms),
        version: Some(version),
        active_connections: Some(active),
        size_bytes: Some(size),
        tables: tables.into_iter().map(|(table, rows)| TableCount { table, rows }).collect(),
        error: None,
        checked_at: Utc::now(),
    })
}

async fn pg_status(pool: &PgPool) -> Result<DbStatus, sqlx::Error> {
    let started = Instant::now();
    sqlx::query("SELECT 1").execute(pool).await?;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    let version: String = sqlx::query_scalar("SELECT current_setting('server_version')")
        .fetch_one(pool)
        .await?;
    let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pg_stat_activity WHERE datname = current_database()")
        .fetch_one(pool)
        .await?;
    let size: i64 = sqlx::query_scalar("SELECT pg_database_size(current_database())")
        .fetch_one(pool)
        .await?;
    let tables: Vec<(String, i64)> =
        sqlx::query_as("SELECT relname::text, n_live_tup FROM pg_stat_user_tables ORDER BY relname")
            .fetch_all(pool)
            .await?;

    Ok(DbStatus {
        database: DbKind::Postgresql,
        reachable: true,
        latency_ms: Some(latency_ms),
        version: Some(version),
        active_connections: Some(active),
        size_bytes: Some(size),
        tables: tables.into_iter().map(|(table, rows)| TableCount { table, rows }).collect(),
        error: None,
        checked_at: Utc::now(),
    })
}

fn render(report: &[DbStatus], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            for status in report {
                print!("{}", format_status(status));
            }
            Ok(())
        }
    }
}

/// Human-readable byte count
pub fn human_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes.max(0))
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn format_status(status: &DbStatus) -> String {
    let mut out = String::new();
    let stamp = status.checked_at.format("%H:%M:%S");
    if !status.reachable {
        out.push_str(&format!(
            "[{}] ✗ {}: unreachable ({})\n",
            stamp,
            status.database,
            status.error.as_deref().unwrap_or("unknown error")
        ));
        return out;
    }
    out.push_str(&format!(
        "[{}] ✓ {} {} | latency {:.1} ms | connections {} | size {}\n",
        stamp,
        status.database,
        status.version.as_deref().unwrap_or("?"),
        status.latency_ms.unwrap_or_default(),
        status.active_connections.unwrap_or_default(),
        human_bytes(status.size_bytes.unwrap_or_default()),
    ));
    for table in &status.tables {
        out.push_str(&format!("    {:<28} {:>12}\n", table.table, table.rows));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanised() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(human_bytes(-1), "0 B");
    }

    #[test]
    fn unreachable_status_renders_error() {
        let text = format_status(&DbStatus::down(DbKind::Mysql, "connection refused"));
        assert!(text.contains("mysql: unreachable (connection refused)"));
    }

    #[tokio::test]
    async fn unreachable_database_is_reported_not_fatal() {
        let mut config = DashConfig::default();
        let mut db = DatabaseConfig::new("postgres://nobody@127.0.0.1:1/none");
        db.connect_timeout_secs = 1;
        config.postgresql = Some(db);
        let report = collect(&config, Target::All).await.unwrap();
        assert_eq!(report.len(), 1);
        assert!(!report[0].reachable);
        assert!(report[0].error.is_some());
    }
}
