//! Database security audit
//!
//! Gathers account and transport facts from each database, then evaluates
//! them into findings. Facts that need privileges the connecting user lacks
//! become `info` findings instead of failing the audit.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use devdash_core::{DashConfig, DbKind};
use serde::Serialize;
use sqlx::{MySqlPool, PgPool};

use super::{connect, print_json, OutputFormat, Target};

#[derive(Parser, Debug)]
pub struct SecurityArgs {
    #[command(subcommand)]
    pub command: SecurityCommands,
}

#[derive(Subcommand, Debug)]
pub enum SecurityCommands {
    /// Check TLS enforcement and risky accounts
    Audit(AuditArgs),
}

#[derive(Parser, Debug)]
pub struct AuditArgs {
    #[arg(long, value_enum, default_value_t = Target::All)]
    pub target: Target,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Superuser accounts allowed before warning
    #[arg(long, default_value_t = 2)]
    pub max_superusers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub database: DbKind,
    pub check: &'static str,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn new(database: DbKind, check: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            database,
            check,
            severity,
            message: message.into(),
        }
    }
}

/// Account and transport facts; `None` means the query was not permitted.
#[derive(Debug, Default)]
pub struct MysqlFacts {
    pub require_secure_transport: Option<bool>,
    pub anonymous_accounts: Option<Vec<String>>,
    pub empty_password_accounts: Option<Vec<String>>,
    pub remote_root_accounts: Option<Vec<String>>,
    pub superusers: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct PgFacts {
    pub ssl: Option<bool>,
    pub password_encryption: Option<String>,
    pub superusers: Option<Vec<String>>,
    pub login_roles_without_password: Option<Vec<String>>,
}

pub async fn run_security(args: SecurityArgs, config: DashConfig) -> Result<()> {
    let SecurityCommands::Audit(audit) = args.command;
    let dbs = connect(&config, audit.target).await?;

    let mut findings = Vec::new();
    if let Some(ref pool) = dbs.mysql {
        findings.extend(evaluate_mysql(&mysql_facts(pool).await, audit.max_superusers));
    }
    if let Some(ref pool) = dbs.postgres {
        findings.extend(evaluate_pg(&pg_facts(pool).await, audit.max_superusers));
    }
    findings.sort_by(|a, b| b.severity.cmp(&a.severity));

    match audit.format {
        OutputFormat::Json => print_json(&findings)?,
        OutputFormat::Text => {
            for f in &findings {
                let icon = match f.severity {
                    Severity::Info => "ℹ",
                    Severity::Warning => "⚠",
                    Severity::Critical => "✗",
                };
                println!("{} [{}] {} {}: {}", icon, f.database, f.check, f.severity_label(), f.message);
            }
        }
    }

    let critical = findings.iter().filter(|f| f.severity == Severity::Critical).count();
    if critical > 0 {
        bail!("{} critical finding(s)", critical);
    }
    Ok(())
}

impl Finding {
    fn severity_label(&self) -> &'static str {
        match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

fn permitted<T>(result: Result<T, sqlx::Error>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "cannot read {}", what);
            None
        }
    }
}

async fn mysql_accounts(pool: &MySqlPool, condition: &str) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(&format!(
        "SELECT CAST(CONCAT(user, '@', host) AS CHAR) FROM mysql.user WHERE {} ORDER BY user, host",
        condition
    ))
    .fetch_all(pool)
    .await
}

async fn mysql_facts(pool: &MySqlPool) -> MysqlFacts {
    let secure: Result<i64, _> = sqlx::query_scalar("SELECT CAST(@@require_secure_transport AS SIGNED)")
        .fetch_one(pool)
        .await;
    MysqlFacts {
        require_secure_transport: permitted(secure, "require_secure_transport").map(|v| v != 0),
        anonymous_accounts: permitted(mysql_accounts(pool, "user = ''").await, "mysql.user"),
        empty_password_accounts: permitted(
            mysql_accounts(pool, "authentication_string = '' AND account_locked = 'N'").await,
            "mysql.user",
        ),
        remote_root_accounts: permitted(
            mysql_accounts(pool, "user = 'root' AND host NOT IN ('localhost', '127.0.0.1', '::1')").await,
            "mysql.user",
        ),
        superusers: permitted(
            mysql_accounts(pool, "Super_priv = 'Y' AND account_locked = 'N'").await,
            "mysql.user",
        ),
    }
}

async fn pg_facts(pool: &PgPool) -> PgFacts {
    let ssl: Result<String, _> = sqlx::query_scalar("SELECT current_setting('ssl')").fetch_one(pool).await;
    let encryption: Result<String, _> = sqlx::query_scalar("SELECT current_setting('password_encryption')")
        .fetch_one(pool)
        .await;
    let superusers: Result<Vec<String>, _> =
        sqlx::query_scalar("SELECT rolname::text FROM pg_roles WHERE rolsuper AND rolcanlogin ORDER BY rolname")
            .fetch_all(pool)
            .await;
    // pg_shadow needs superuser
    let no_password: Result<Vec<String>, _> =
        sqlx::query_scalar("SELECT usename::text FROM pg_shadow WHERE passwd IS NULL ORDER BY usename")
            .fetch_all(pool)
            .await;
    PgFacts {
        ssl: permitted(ssl, "ssl").map(|s| s == "on"),
        password_encryption: permitted(encryption, "password_encryption"),
        superusers: permitted(superusers, "pg_roles"),
        login_roles_without_password: permitted(no_password, "pg_shadow"),
    }
}

fn not_visible(database: DbKind, check: &'static str) -> Finding {
    Finding::new(database, check, Severity::Info, "not visible to the connecting user; run as an admin")
}

pub fn evaluate_mysql(facts: &MysqlFacts, max_superusers: usize) -> Vec<Finding> {
    let db = DbKind::Mysql;
    let mut out = Vec::new();

    out.push(match facts.require_secure_transport {
        Some(true) => Finding::new(db, "tls", Severity::Info, "require_secure_transport is ON"),
        Some(false) => Finding::new(db, "tls", Severity::Warning, "require_secure_transport is OFF; plaintext connections accepted"),
        None => not_visible(db, "tls"),
    });

    match &facts.anonymous_accounts {
        Some(accounts) if !accounts.is_empty() => out.push(Finding::new(
            db,
            "anonymous_accounts",
            Severity::Critical,
            format!("anonymous accounts exist: {}", accounts.join(", ")),
        )),
        Some(_) => out.push(Finding::new(db, "anonymous_accounts", Severity::Info, "no anonymous accounts")),
        None => out.push(not_visible(db, "anonymous_accounts")),
    }

    match &facts.empty_password_accounts {
        Some(accounts) if !accounts.is_empty() => out.push(Finding::new(
            db,
            "empty_passwords",
            Severity::Critical,
            format!("accounts without a password: {}", accounts.join(", ")),
        )),
        Some(_) => out.push(Finding::new(db, "empty_passwords", Severity::Info, "every unlocked account has a password")),
        None => out.push(not_visible(db, "empty_passwords")),
    }

    match &facts.remote_root_accounts {
        Some(accounts) if !accounts.is_empty() => out.push(Finding::new(
            db,
            "remote_root",
            Severity::Critical,
            format!("root can log in remotely: {}", accounts.join(", ")),
        )),
        Some(_) => out.push(Finding::new(db, "remote_root", Severity::Info, "root is local only")),
        None => out.push(not_visible(db, "remote_root")),
    }

    out.push(superuser_finding(db, facts.superusers.as_deref(), max_superusers));
    out
}

pub fn evaluate_pg(facts: &PgFacts, max_superusers: usize) -> Vec<Finding> {
    let db = DbKind::Postgresql;
    let mut out = Vec::new();

    out.push(match facts.ssl {
        Some(true) => Finding::new(db, "tls", Severity::Info, "ssl is on"),
        Some(false) => Finding::new(db, "tls", Severity::Warning, "ssl is off; connections are plaintext"),
        None => not_visible(db, "tls"),
    });

    match facts.password_encryption.as_deref() {
        Some("scram-sha-256") => out.push(Finding::new(db, "password_encryption", Severity::Info, "scram-sha-256")),
        Some(other) => out.push(Finding::new(
            db,
            "password_encryption",
            Severity::Warning,
            format!("password_encryption is {}; prefer scram-sha-256", other),
        )),
        None => out.push(not_visible(db, "password_encryption")),
    }

    match &facts.login_roles_without_password {
        Some(roles) if !roles.is_empty() => out.push(Finding::new(
            db,
            "empty_passwords",
            Severity::Warning,
            format!("roles without a password (trust/peer auth only): {}", roles.join(", ")),
        )),
        Some(_) => out.push(Finding::new(db, "empty_passwords", Severity::Info, "every role has a password")),
        None => out.push(not_visible(db, "empty_passwords")),
    }

    out.push(superuser_finding(db, facts.superusers.as_deref(), max_superusers));
    out
}

fn superuser_finding(db: DbKind, superusers: Option<&[String]>, max: usize) -> Finding {
    match superusers {
        Some(users) if users.len() > max => Finding::new(
            db,
            "superusers",
            Severity::Warning,
            format!("{} superuser accounts (max {}): {}", users.len(), max, users.join(", ")),
        ),
        Some(users) => Finding::new(db, "superusers", Severity::Info, format!("{} superuser account(s)", users.len())),
        None => not_visible(db, "superusers"),
    }
}
