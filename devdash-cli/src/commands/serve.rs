//! HTTP server command
//!
//! Runs the dashboard API with pools, migrations and the notes store built
//! from config. Flags override the `[server]` section.

use anyhow::{Context, Result};
use clap::Parser;
use devdash_core::{DashConfig, NotesBackend};
use devdash_server::{build_state, run_server, ServerConfig};

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default from config: 127.0.0.1:3000)
    #[arg(long, short = 'b', env = "DEVDASH_BIND")]
    pub bind: Option<String>,

    /// Notes storage: postgres, mysql, dual, fallback or memory
    #[arg(long, env = "DEVDASH_NOTES_BACKEND")]
    pub notes_backend: Option<NotesBackend>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip schema migrations at startup
    #[arg(long)]
    pub no_migrate: bool,
}

impl ServeArgs {
    fn apply(self, config: &mut DashConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(backend) = self.notes_backend {
            config.server.notes_backend = backend;
        }
        if self.cors_permissive {
            config.server.cors_permissive = true;
        }
        if let Some(timeout) = self.timeout {
            config.server.request_timeout_secs = timeout;
        }
        if self.no_migrate {
            for db in [config.mysql.as_mut(), config.postgresql.as_mut()].into_iter().flatten() {
                db.run_migrations = false;
            }
        }
    }
}

/// Run the HTTP server until Ctrl+C / SIGTERM
pub async fn run_serve(args: ServeArgs, mut config: DashConfig) -> Result<()> {
    args.apply(&mut config);

    let server_config = ServerConfig::from_settings(&config.server).context("invalid [server] settings")?;

    tracing::info!(
        bind = %server_config.bind_addr,
        notes = %config.server.notes_backend,
        mysql = config.mysql.is_some(),
        postgresql = config.postgresql.is_some(),
        "starting devdash server"
    );

    let state = build_state(&config).await.context("failed to initialise databases")?;

    run_server(state, server_config).await.context("server error")?;

    Ok(())
}
