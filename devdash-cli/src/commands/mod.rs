//! Command implementations for the devdash CLI

pub mod backup;
pub mod check;
pub mod config;
pub mod generate;
pub mod loadtest;
pub mod metabase;
pub mod monitor;
pub mod optimize;
pub mod security;
pub mod serve;
pub mod tunnel;

pub use backup::run_backup;
pub use check::run_check;
pub use config::run_config;
pub use generate::run_generate;
pub use loadtest::run_loadtest;
pub use metabase::run_metabase;
pub use monitor::run_monitor;
pub use optimize::run_optimize;
pub use security::run_security;
pub use serve::run_serve;
pub use tunnel::run_tunnel;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use devdash_core::{DashConfig, DbKind};
use devdash_server::db::{connect_mysql_strict, connect_pg_strict};
use sqlx::{MySqlPool, PgPool};

/// Which configured database(s) a maintenance command acts on
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    Mysql,
    Postgresql,
    #[default]
    All,
}

impl Target {
    pub fn kinds(self) -> Vec<DbKind> {
        match self {
            Self::Mysql => vec![DbKind::Mysql],
            Self::Postgresql => vec![DbKind::Postgresql],
            Self::All => DbKind::ALL.to_vec(),
        }
    }
}

/// Text or JSON output for report-style commands
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Eagerly connected pools for the requested targets
#[derive(Default)]
pub struct Databases {
    pub mysql: Option<MySqlPool>,
    pub postgres: Option<PgPool>,
}

/// Connect to every requested database that is configured.
///
/// With `Target::All` unconfigured databases are skipped; naming one
/// explicitly that has no config section is an error.
pub async fn connect(config: &DashConfig, target: Target) -> Result<Databases> {
    let mut dbs = Databases::default();
    for kind in target.kinds() {
        let Some(db_config) = config.database(kind) else {
            if target != Target::All {
                bail!("{} is not configured (add a [{}] section or set its URL)", kind, kind);
            }
            tracing::debug!(database = %kind, "not configured, skipping");
            continue;
        };
        match kind {
            DbKind::Mysql => {
                dbs.mysql = Some(
                    connect_mysql_strict(db_config)
                        .await
                        .context("failed to connect to MySQL")?,
                )
            }
            DbKind::Postgresql => {
                dbs.postgres = Some(
                    connect_pg_strict(db_config)
                        .await
                        .context("failed to connect to PostgreSQL")?,
                )
            }
        }
    }
    if dbs.mysql.is_none() && dbs.postgres.is_none() {
        bail!("no databases configured; run `devdash config init` or set MYSQL_URL / DATABASE_URL");
    }
    Ok(dbs)
}

/// Print a serializable value as pretty JSON on stdout
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_kinds() {
        assert_eq!(Target::Mysql.kinds(), vec![DbKind::Mysql]);
        assert_eq!(Target::All.kinds().len(), 2);
    }

    #[tokio::test]
    async fn connect_requires_some_database() {
        let err = connect(&DashConfig::default(), Target::All).await.err().unwrap();
        assert!(err.to_string().contains("no databases configured"));

        let err = connect(&DashConfig::default(), Target::Mysql).await.err().unwrap();
        assert!(err.to_string().contains("mysql is not configured"));
    }
}
