//! devdash CLI - DevOps dashboard API and operations tooling
//!
//! This is the main entry point for the devdash command-line tool, which provides:
//! - The REST API server (`serve`)
//! - Compressed database backups with verification (`backup`)
//! - Database monitoring, maintenance and security audits (`monitor`, `optimize`, `security`)
//! - SSH tunnels through a bastion host (`tunnel`)
//! - The API/database test harness and load tester (`check`, `loadtest`)
//! - Sample business data generation (`generate`)
//! - Metabase dashboard provisioning and checks (`metabase`)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use devdash_core::DashConfig;

mod commands;
mod tracing_setup;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "devdash",
    author,
    version,
    about = "DevOps dashboard: REST API over MySQL and PostgreSQL plus ops tooling",
    long_about = "Serve the dashboard API, back up and restore its databases, monitor and tune them, \
                  open bastion tunnels, and run functional and load tests against a deployment."
)]
struct Cli {
    /// Suppress progress spinners (for scripts and CI logs)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces to an OTLP endpoint (requires the telemetry feature)
    #[arg(long, global = true)]
    otel: bool,

    /// Config file (default: ~/.devdash/config.toml)
    #[arg(long, global = true, env = "DEVDASH_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Database backups (run, restore, list, cleanup)
    Backup(commands::backup::BackupArgs),
    /// Database status and live monitoring
    Monitor(commands::monitor::MonitorArgs),
    /// Table maintenance (analyze, vacuum, report)
    Optimize(commands::optimize::OptimizeArgs),
    /// Database security audit
    Security(commands::security::SecurityArgs),
    /// SSH tunnel to a database behind a bastion host
    Tunnel(commands::tunnel::TunnelArgs),
    /// Run the API and database test suite
    Check(commands::check::CheckArgs),
    /// Load test a running deployment
    Loadtest(commands::loadtest::LoadtestArgs),
    /// Insert generated orders, events and metrics
    Generate(commands::generate::GenerateArgs),
    /// Provision and test Metabase dashboards (setup, check)
    Metabase(commands::metabase::MetabaseArgs),
    /// Manage devdash configuration (init, show, path, validate)
    Config(commands::config::ConfigArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

fn load_config(path: Option<&std::path::Path>) -> Result<DashConfig> {
    let config = DashConfig::load(path).context("failed to load configuration")?;
    for problem in config.validate() {
        tracing::warn!("config: {}", problem);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env in the working directory, then ~/.devdash/.env; existing vars win
    dotenvy::dotenv().ok();
    dotenvy::from_path(DashConfig::state_dir().join(".env")).ok();

    let cli = Cli::parse();

    let tracing_config = tracing_setup::TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    };
    tracing_setup::init(&tracing_config).ok();

    ui::init_quiet_mode(cli.quiet);

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Serve(args) => commands::run_serve(args, load_config(config_path)?).await,
        Commands::Backup(args) => commands::run_backup(args, load_config(config_path)?).await,
        Commands::Monitor(args) => commands::run_monitor(args, load_config(config_path)?).await,
        Commands::Optimize(args) => commands::run_optimize(args, load_config(config_path)?).await,
        Commands::Security(args) => commands::run_security(args, load_config(config_path)?).await,
        Commands::Tunnel(args) => commands::run_tunnel(args, load_config(config_path)?).await,
        Commands::Check(args) => commands::run_check(args, load_config(config_path)?).await,
        Commands::Loadtest(args) => commands::run_loadtest(args).await,
        Commands::Generate(args) => commands::run_generate(args, load_config(config_path)?).await,
        Commands::Metabase(args) => commands::run_metabase(args, load_config(config_path)?).await,
        Commands::Config(args) => commands::run_config(args, config_path),
        Commands::Completions(args) => run_completions(args),
    };

    tracing_setup::shutdown_otel();
    result
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());

    Ok(())
}
