//! Table maintenance
//!
//! MySQL: `ANALYZE TABLE` / `OPTIMIZE TABLE` per base table.
//! PostgreSQL: `ANALYZE` / `VACUUM ANALYZE` on the whole database.
//! `report` lists the largest tables by total (data + index) size.
//!
//! Maintenance statements go through `sqlx::raw_sql` (simple protocol):
//! `VACUUM` refuses to run inside the implicit transaction of an extended
//! query.

use anyhow::Result;
use clap::{Parser, Subcommand};
use devdash_core::{DashConfig, DbKind};
use serde::Serialize;
use sqlx::{MySqlPool, PgPool};

use super::monitor::human_bytes;
use super::{connect, print_json, OutputFormat, Target};
use crate::ui;

const REPORT_LIMIT: i64 = 10;

#[derive(Parser, Debug)]
pub struct OptimizeArgs {
    #[command(subcommand)]
    pub command: OptimizeCommands,
}

#[derive(Subcommand, Debug)]
pub enum OptimizeCommands {
    /// Refresh planner statistics
    Analyze(TargetArgs),
    /// Reclaim space (OPTIMIZE TABLE / VACUUM ANALYZE)
    Vacuum(TargetArgs),
    /// List the largest tables
    Report(ReportArgs),
}

#[derive(Parser, Debug)]
pub struct TargetArgs {
    #[arg(long, value_enum, default_value_t = Target::All)]
    pub target: Target,
}

#[derive(Parser, Debug)]
pub struct ReportArgs {
    #[arg(long, value_enum, default_value_t = Target::All)]
    pub target: Target,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Maintenance {
    Analyze,
    Vacuum,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSize {
    pub database: DbKind,
    pub table: String,
    pub rows: i64,
    pub data_bytes: i64,
    pub index_bytes: i64,
    /// PostgreSQL only: rows awaiting vacuum
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_rows: Option<i64>,
}

pub async fn run_optimize(args: OptimizeArgs, config: DashConfig) -> Result<()> {
    match args.command {
        OptimizeCommands::Analyze(t) => maintain(&config, t.target, Maintenance::Analyze).await,
        OptimizeCommands::Vacuum(t) => maintain(&config, t.target, Maintenance::Vacuum).await,
        OptimizeCommands::Report(r) => report(&config, r).await,
    }
}

/// Backtick-quote a MySQL identifier
fn quote_mysql(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn mysql_statement(op: Maintenance, table: &str) -> String {
    let verb = match op {
        Maintenance::Analyze => "ANALYZE TABLE",
        Maintenance::Vacuum => "OPTIMIZE TABLE",
    };
    format!("{} {}", verb, quote_mysql(table))
}

fn pg_statement(op: Maintenance) -> &'static str {
    match op {
        Maintenance::Analyze => "ANALYZE",
        Maintenance::Vacuum => "VACUUM ANALYZE",
    }
}

async fn mysql_tables(pool: &MySqlPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
    )
    .fetch_all(pool)
    .await
}

async fn maintain(config: &DashConfig, target: Target, op: Maintenance) -> Result<()> {
    let dbs = connect(config, target).await?;

    if let Some(ref pool) = dbs.mysql {
        let tables = mysql_tables(pool).await?;
        let pb = ui::spinner(format!("MySQL: {} table(s)", tables.len()));
        let mut failed = 0usize;
        for table in &tables {
            ui::set_message(&pb, format!("MySQL: {}", mysql_statement(op, table)));
            if let Err(e) = sqlx::raw_sql(&mysql_statement(op, table)).execute(pool).await {
                tracing::warn!(table = %table, error = %e, "maintenance failed");
                failed += 1;
            }
        }
        let summary = format!("MySQL: {}/{} tables processed", tables.len() - failed, tables.len());
        tracing::info!("{}", summary);
        ui::finish_success(pb, summary);
    }

    if let Some(ref pool) = dbs.postgres {
        let statement = pg_statement(op);
        ui::with_spinner_async(
            format!("PostgreSQL: {}", statement),
            format!("PostgreSQL: {} complete", statement),
            sqlx::raw_sql(statement).execute(pool),
        )
        .await?;
        tracing::info!(statement, "postgresql maintenance complete");
    }

    Ok(())
}

async fn mysql_sizes(pool: &MySqlPool) -> Result<Vec<TableSize>, sqlx::Error> {
    let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
        "SELECT CAST(TABLE_NAME AS CHAR), \
                CAST(COALESCE(TABLE_ROWS, 0) AS SIGNED), \
                CAST(COALESCE(DATA_LENGTH, 0) AS SIGNED), \
                CAST(COALESCE(INDEX_LENGTH, 0) AS SIGNED) \
         FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
         ORDER BY COALESCE(DATA_LENGTH, 0) + COALESCE(INDEX_LENGTH, 0) DESC \
         LIMIT ?",
    )
    .bind(REPORT_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(table, rows, data_bytes, index_bytes)| TableSize {
            database: DbKind::Mysql,
            table,
            rows,
            data_bytes,
            index_bytes,
            dead_rows: None,
        })
        .collect())
}

async fn pg_sizes(pool: &PgPool) -> Result<Vec<TableSize>, sqlx::Error> {
    let rows: Vec<(String, i64, i64, i64, i64)> = sqlx::query_as(
        "SELECT relname::text, n_live_tup, pg_table_size(relid), pg_indexes_size(relid), n_dead_tup \
         FROM pg_stat_user_tables \
         ORDER BY pg_total_relation_size(relid) DESC \
         LIMIT $1",
    )
    .bind(REPORT_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(table, rows, data_bytes, index_bytes, dead)| TableSize {
            database: DbKind::Postgresql,
            table,
            rows,
            data_bytes,
            index_bytes,
            dead_rows: Some(dead),
        })
        .collect())
}

async fn report(config: &DashConfig, args: ReportArgs) -> Result<()> {
    let dbs = connect(config, args.target).await?;
    let mut sizes = Vec::new();
    if let Some(ref pool) = dbs.mysql {
        sizes.extend(mysql_sizes(pool).await?);
    }
    if let Some(ref pool) = dbs.postgres {
        sizes.extend(pg_sizes(pool).await?);
    }

    match args.format {
        OutputFormat::Json => print_json(&sizes)?,
        OutputFormat::Text => {
            println!(
                "{:<11} {:<28} {:>12} {:>10} {:>10} {:>10}",
                "database", "table", "rows", "data", "index", "dead"
            );
            for s in &sizes {
                println!(
                    "{:<11} {:<28} {:>12} {:>10} {:>10} {:>10}",
                    s.database.as_str(),
                    s.table,
                    s.rows,
                    human_bytes(s.data_bytes),
                    human_bytes(s.index_bytes),
                    s.dead_rows.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_identifiers_are_quoted() {
        assert_eq!(mysql_statement(Maintenance::Analyze, "orders"), "ANALYZE TABLE `orders`");
        assert_eq!(mysql_statement(Maintenance::Vacuum, "we`ird"), "OPTIMIZE TABLE `we``ird`");
    }

    #[test]
    fn pg_vacuum_also_analyzes() {
        assert_eq!(pg_statement(Maintenance::Vacuum), "VACUUM ANALYZE");
    }
}
