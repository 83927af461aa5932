//! SSH tunnels to databases behind a bastion host
//!
//! Parameters come from a `.env`-style file with `TUNNEL_*` keys. `start`
//! runs `ssh -N -L local:remote_host:remote_port user@bastion` in the
//! background and records its pid under `~/.devdash/tunnels/<name>.pid`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use devdash_core::DashConfig;
use tokio::net::TcpStream;

const READY_ATTEMPTS: u32 = 20;
const READY_DELAY: Duration = Duration::from_millis(500);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
pub struct TunnelArgs {
    /// File with TUNNEL_* keys (default: [tunnel].env_file or ./.env.tunnel)
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: TunnelCommands,
}

#[derive(Subcommand, Debug)]
pub enum TunnelCommands {
    /// Open the tunnel in the background
    Start,
    /// Close a running tunnel
    Stop,
    /// Show whether the tunnel is up
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub name: String,
    pub bastion_host: String,
    pub bastion_user: String,
    pub ssh_key: Option<PathBuf>,
    pub remote_host: String,
    pub remote_port: u16,
    pub local_port: u16,
}

impl TunnelSpec {
    /// Build from parsed `KEY=value` pairs.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let required = |key: &str| {
            vars.get(key)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or_else(|| anyhow!("{} is not set", key))
        };
        let port = |key: &str| -> Result<u16> {
            required(key)?
                .parse()
                .with_context(|| format!("{} must be a port number", key))
        };

        let remote_port = port("TUNNEL_REMOTE_PORT")?;
        let local_port = match vars.get("TUNNEL_LOCAL_PORT") {
            Some(_) => port("TUNNEL_LOCAL_PORT")?,
            None => remote_port,
        };

        Ok(Self {
            name: vars
                .get("TUNNEL_NAME")
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| "default".to_string()),
            bastion_host: required("TUNNEL_BASTION_HOST")?,
            bastion_user: required("TUNNEL_BASTION_USER")?,
            ssh_key: vars
                .get("TUNNEL_SSH_KEY")
                .filter(|v| !v.trim().is_empty())
                .map(|v| expand_home(v)),
            remote_host: required("TUNNEL_REMOTE_HOST")?,
            remote_port,
            local_port,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut vars = HashMap::new();
        let iter = dotenvy::from_path_iter(path)
            .with_context(|| format!("Failed to read tunnel env file: {}", path.display()))?;
        for item in iter {
            let (key, value) = item.with_context(|| format!("Invalid line in {}", path.display()))?;
            vars.insert(key, value);
        }
        Self::from_vars(&vars)
    }

    pub fn ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-N".to_string(),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=60".to_string(),
            "-L".to_string(),
            format!("{}:{}:{}", self.local_port, self.remote_host, self.remote_port),
        ];
        if let Some(ref key) = self.ssh_key {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(format!("{}@{}", self.bastion_user, self.bastion_host));
        args
    }

    fn local_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.local_port))
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|h| h.join(rest)).unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

fn pid_path(name: &str) -> PathBuf {
    DashConfig::state_dir().join("tunnels").join(format!("{}.pid", name))
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn port_open(addr: SocketAddr) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

fn env_file(args_file: Option<PathBuf>, config: &DashConfig) -> PathBuf {
    args_file
        .or_else(|| config.tunnel.env_file.clone())
        .unwrap_or_else(|| PathBuf::from(".env.tunnel"))
}

pub async fn run_tunnel(args: TunnelArgs, config: DashConfig) -> Result<()> {
    let spec = TunnelSpec::load(&env_file(args.env_file, &config))?;
    match args.command {
        TunnelCommands::Start => start(&spec).await,
        TunnelCommands::Stop => stop(&spec),
        TunnelCommands::Status => status(&spec).await,
    }
}

async fn start(spec: &TunnelSpec) -> Result<()> {
    let pid_file = pid_path(&spec.name);
    if let Some(pid) = read_pid(&pid_file) {
        if process_alive(pid) {
            bail!("tunnel '{}' is already running (pid {})", spec.name, pid);
        }
        tracing::debug!(pid, "removing stale pid file");
        let _ = std::fs::remove_file(&pid_file);
    }
    if port_open(spec.local_addr()).await {
        bail!("local port {} is already in use", spec.local_port);
    }

    let mut child = Command::new("ssh")
        .args(spec.ssh_args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to run ssh (is OpenSSH installed?)")?;
    let pid = child.id();

    if let Some(parent) = pid_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&pid_file, pid.to_string())
        .with_context(|| format!("Failed to write {}", pid_file.display()))?;

    for _ in 0..READY_ATTEMPTS {
        if let Some(exit) = child.try_wait()? {
            let _ = std::fs::remove_file(&pid_file);
            bail!("ssh exited early ({}); check the bastion and key settings", exit);
        }
        if port_open(spec.local_addr()).await {
            tracing::info!(name = %spec.name, pid, local_port = spec.local_port, "tunnel started");
            println!(
                "✓ tunnel '{}' up: localhost:{} -> {}:{} via {} (pid {})",
                spec.name, spec.local_port, spec.remote_host, spec.remote_port, spec.bastion_host, pid
            );
            return Ok(());
        }
        tokio::time::sleep(READY_DELAY).await;
    }

    let _ = child.kill();
    let _ = std::fs::remove_file(&pid_file);
    bail!("tunnel did not open local port {} in time", spec.local_port)
}

fn stop(spec: &TunnelSpec) -> Result<()> {
    let pid_file = pid_path(&spec.name);
    let Some(pid) = read_pid(&pid_file) else {
        println!("tunnel '{}' is not running", spec.name);
        return Ok(());
    };

    if process_alive(pid) {
        let status = Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status()
            .context("Failed to run kill")?;
        if !status.success() {
            bail!("Failed to stop tunnel process {}", pid);
        }
        tracing::info!(name = %spec.name, pid, "tunnel stopped");
        println!("✓ tunnel '{}' stopped", spec.name);
    } else {
        println!("tunnel '{}' was not running (stale pid {})", spec.name, pid);
    }
    std::fs::remove_file(&pid_file).with_context(|| format!("Failed to remove {}", pid_file.display()))?;
    Ok(())
}

async fn status(spec: &TunnelSpec) -> Result<()> {
    let pid = read_pid(&pid_path(&spec.name));
    let alive = pid.map(process_alive).unwrap_or(false);
    let reachable = port_open(spec.local_addr()).await;

    println!("tunnel:    {}", spec.name);
    println!("forward:   localhost:{} -> {}:{}", spec.local_port, spec.remote_host, spec.remote_port);
    println!("bastion:   {}@{}", spec.bastion_user, spec.bastion_host);
    match pid {
        Some(pid) => println!("process:   {} ({})", pid, if alive { "running" } else { "dead" }),
        None => println!("process:   none"),
    }
    println!("local port: {}", if reachable { "reachable" } else { "closed" });

    if !(alive && reachable) {
        bail!("tunnel '{}' is down", spec.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn base() -> HashMap<String, String> {
        vars(&[
            ("TUNNEL_BASTION_HOST", "bastion.example.com"),
            ("TUNNEL_BASTION_USER", "ec2-user"),
            ("TUNNEL_REMOTE_HOST", "db.internal"),
            ("TUNNEL_REMOTE_PORT", "5432"),
        ])
    }

    #[test]
    fn defaults_local_port_and_name() {
        let spec = TunnelSpec::from_vars(&base()).unwrap();
        assert_eq!(spec.local_port, 5432);
        assert_eq!(spec.name, "default");
        assert!(spec.ssh_key.is_none());
    }

    #[test]
    fn missing_bastion_is_an_error() {
        let mut v = base();
        v.remove("TUNNEL_BASTION_HOST");
        let err = TunnelSpec::from_vars(&v).unwrap_err();
        assert!(err.to_string().contains("TUNNEL_BASTION_HOST"));
    }

    #[test]
    fn bad_port_is_an_error() {
        let mut v = base();
        v.insert("TUNNEL_LOCAL_PORT".into(), "not-a-port".into());
        assert!(TunnelSpec::from_vars(&v).is_err());
    }

    #[test]
    fn ssh_arguments() {
        let mut v = base();
        v.insert("TUNNEL_LOCAL_PORT".into(), "15432".into());
        v.insert("TUNNEL_SSH_KEY".into(), "/keys/bastion.pem".into());
        let args = TunnelSpec::from_vars(&v).unwrap().ssh_args();
        assert_eq!(args[0], "-N");
        // ssh must stay in the foreground so the recorded pid is the tunnel's
        assert!(!args.iter().any(|a| a == "-f"));
        assert!(args.contains(&"15432:db.internal:5432".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/keys/bastion.pem"));
        assert_eq!(args.last().unwrap(), "ec2-user@bastion.example.com");
    }

    #[test]
    fn loads_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.tunnel");
        std::fs::write(
            &path,
            "# staging\nTUNNEL_NAME=staging-mysql\nTUNNEL_BASTION_HOST=1.2.3.4\n\
             TUNNEL_BASTION_USER=ops\nTUNNEL_REMOTE_HOST=mysql.internal\nTUNNEL_REMOTE_PORT=3306\n\
             TUNNEL_LOCAL_PORT=13306\n",
        )
        .unwrap();
        let spec = TunnelSpec::load(&path).unwrap();
        assert_eq!(spec.name, "staging-mysql");
        assert_eq!(spec.local_port, 13306);
    }

    #[test]
    fn unparseable_pid_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.pid");
        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(read_pid(&path), None);
        assert_eq!(read_pid(&dir.path().join("missing.pid")), None);
    }
}
