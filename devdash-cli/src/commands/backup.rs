//! Database backups
//!
//! `mysqldump` / `pg_dump` stdout is streamed through gzip into
//! `<dir>/<kind>_<database>_<YYYYmmdd_HHMMSS>.sql.gz`, then the head of the
//! decompressed file is checked for the engine's dump banner. Passwords are
//! handed to the client binaries through `MYSQL_PWD` / `PGPASSWORD`, never
//! on the command line.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use devdash_core::config::ConnectionParts;
use devdash_core::{DashConfig, DbKind};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use walkdir::WalkDir;

use super::Target;
use crate::ui;

/// Bytes of decompressed output inspected when verifying a dump
const VERIFY_HEAD_BYTES: usize = 8 * 1024;
const BACKUP_SUFFIX: &str = ".sql.gz";

#[derive(Parser, Debug)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupCommands,
}

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Dump, compress and verify the configured databases
    Run(RunArgs),
    /// Restore a compressed dump
    Restore(RestoreArgs),
    /// List backup files
    List(DirArgs),
    /// Delete backups older than the retention period
    Cleanup(CleanupArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Database(s) to back up
    #[arg(long, value_enum, default_value_t = Target::All)]
    pub target: Target,

    /// Backup directory (default from config: ~/.devdash/backups)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Compressed dump to restore
    #[arg(long, short)]
    pub file: PathBuf,

    /// mysql or postgresql (inferred from the file name when omitted)
    #[arg(long)]
    pub target: Option<DbKind>,
}

#[derive(Parser, Debug)]
pub struct DirArgs {
    /// Backup directory (default from config)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Keep backups newer than this many days (default from config)
    #[arg(long)]
    pub retention_days: Option<u32>,

    /// Show what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,

    /// Backup directory (default from config)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

pub async fn run_backup(args: BackupArgs, config: DashConfig) -> Result<()> {
    match args.command {
        BackupCommands::Run(run) => run_dumps(run, &config).await,
        BackupCommands::Restore(restore) => run_restore(restore, &config).await,
        BackupCommands::List(list) => run_list(&list.dir.unwrap_or_else(|| config.backup.dir.clone())),
        BackupCommands::Cleanup(cleanup) => {
            let dir = cleanup.dir.clone().unwrap_or_else(|| config.backup.dir.clone());
            let days = cleanup.retention_days.unwrap_or(config.backup.retention_days);
            run_cleanup(&dir, days, cleanup.dry_run)
        }
    }
}

/// What happened to one requested target
#[derive(Debug)]
enum DumpOutcome {
    Written { path: PathBuf, bytes: u64 },
    Skipped(String),
    Failed(anyhow::Error),
}

async fn run_dumps(args: RunArgs, config: &DashConfig) -> Result<()> {
    let dir = args.dir.unwrap_or_else(|| config.backup.dir.clone());
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut outcomes = Vec::new();
    for kind in args.target.kinds() {
        let Some(db) = config.database(kind) else {
            if args.target != Target::All {
                bail!("{} is not configured", kind);
            }
            continue;
        };
        let parts = db.parts(kind)?;
        let path = dir.join(backup_file_name(kind, &parts.database, Local::now().naive_local()));

        let pb = ui::spinner(format!("Dumping {} database '{}'", kind, parts.database));
        let outcome = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || dump_to_file(kind, &parts, &path))
                .await
                .map_err(|e| anyhow!("dump task panicked: {}", e))
                .and_then(|r| r)
        };

        let outcome = match outcome {
            Ok(bytes) => match verify_backup(&path, kind) {
                Ok(()) => DumpOutcome::Written { path, bytes },
                Err(e) => DumpOutcome::Failed(e),
            },
            Err(e) if is_missing_binary(&e) => {
                DumpOutcome::Skipped(format!("{} not found on PATH", kind.dump_binary()))
            }
            Err(e) => {
                fs::remove_file(&path).ok();
                DumpOutcome::Failed(e)
            }
        };

        match &outcome {
            DumpOutcome::Written { path, bytes } => {
                tracing::info!(database = %kind, path = %path.display(), bytes, "backup written");
                ui::finish_success(pb, format!("{} → {} ({} bytes)", kind, path.display(), bytes));
            }
            DumpOutcome::Skipped(reason) => {
                tracing::warn!(database = %kind, "backup skipped: {}", reason);
                ui::finish_error(pb, format!("{} skipped: {}", kind, reason));
            }
            DumpOutcome::Failed(e) => {
                tracing::error!(database = %kind, "backup failed: {:#}", e);
                ui::finish_error(pb, format!("{} failed: {:#}", kind, e));
            }
        }
        outcomes.push(outcome);
    }

    if outcomes.is_empty() {
        bail!("no databases configured to back up");
    }
    if outcomes.iter().all(|o| !matches!(o, DumpOutcome::Written { .. })) {
        bail!("every requested backup failed or was skipped");
    }
    Ok(())
}

/// `<kind>_<database>_<YYYYmmdd_HHMMSS>.sql.gz`
pub fn backup_file_name(kind: DbKind, database: &str, at: NaiveDateTime) -> String {
    format!("{}_{}_{}{}", kind, database, at.format("%Y%m%d_%H%M%S"), BACKUP_SUFFIX)
}

/// Engine named by a backup file's prefix
pub fn infer_kind(path: &Path) -> Option<DbKind> {
    let name = path.file_name()?.to_str()?;
    DbKind::ALL
        .into_iter()
        .find(|kind| name.starts_with(&format!("{}_", kind)))
}

fn dump_command(kind: DbKind, parts: &ConnectionParts) -> Command {
    let mut cmd = Command::new(kind.dump_binary());
    match kind {
        DbKind::Mysql => {
            cmd.args(["--single-transaction", "--routines", "--triggers"])
                .arg(format!("--host={}", parts.host))
                .arg(format!("--port={}", parts.port))
                .arg(format!("--user={}", parts.user))
                .arg(&parts.database);
            if let Some(ref password) = parts.password {
                cmd.env("MYSQL_PWD", password);
            }
        }
        DbKind::Postgresql => {
            cmd.args(["--format=plain", "--no-owner", "--no-password"])
                .arg(format!("--host={}", parts.host))
                .arg(format!("--port={}", parts.port))
                .arg(format!("--username={}", parts.user))
                .arg(&parts.database);
            if let Some(ref password) = parts.password {
                cmd.env("PGPASSWORD", password);
            }
        }
    }
    cmd
}

fn restore_command(kind: DbKind, parts: &ConnectionParts) -> Command {
    let mut cmd = Command::new(kind.client_binary());
    match kind {
        DbKind::Mysql => {
            cmd.arg(format!("--host={}", parts.host))
                .arg(format!("--port={}", parts.port))
                .arg(format!("--user={}", parts.user))
                .arg(&parts.database);
            if let Some(ref password) = parts.password {
                cmd.env("MYSQL_PWD", password);
            }
        }
        DbKind::Postgresql => {
            cmd.args(["--quiet", "--no-password", "--set=ON_ERROR_STOP=1"])
                .arg(format!("--host={}", parts.host))
                .arg(format!("--port={}", parts.port))
                .arg(format!("--username={}", parts.user))
                .arg(format!("--dbname={}", parts.database));
            if let Some(ref password) = parts.password {
                cmd.env("PGPASSWORD", password);
            }
        }
    }
    cmd
}

fn is_missing_binary(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|io| io.kind() == io::ErrorKind::NotFound)
}

/// Stream a dump through gzip into `path`; returns compressed size.
fn dump_to_file(kind: DbKind, parts: &ConnectionParts, path: &Path) -> Result<u64> {
    gzip_stdout(dump_command(kind, parts), kind.dump_binary(), path)
}

/// Collect a child's stderr on its own thread so a chatty client cannot
/// block on a full pipe while stdin or stdout is being streamed.
fn drain_stderr(child: &mut Child) -> JoinHandle<String> {
    let stderr = child.stderr.take();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).trim().to_string()
    })
}

fn gzip_stdout(mut command: Command, binary: &str, path: &Path) -> Result<u64> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {}", binary))?;
    let stderr = drain_stderr(&mut child);

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("{} stdout unavailable", binary))?;

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    io::copy(&mut stdout, &mut encoder).context("failed to compress dump stream")?;
    encoder.finish()?.flush()?;

    let status = child.wait()?;
    let stderr = stderr.join().unwrap_or_default();
    if !status.success() {
        bail!("{} exited with {}: {}", binary, status, stderr);
    }
    if !stderr.is_empty() {
        tracing::debug!(binary, stderr = %stderr, "dump client warnings");
    }
    Ok(fs::metadata(path)?.len())
}

/// Check the decompressed head contains the engine's dump banner.
pub fn verify_backup(path: &Path, kind: DbKind) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut head = Vec::with_capacity(VERIFY_HEAD_BYTES);
    GzDecoder::new(BufReader::new(file))
        .take(VERIFY_HEAD_BYTES as u64)
        .read_to_end(&mut head)
        .with_context(|| format!("{} is not a valid gzip file", path.display()))?;

    let text = String::from_utf8_lossy(&head);
    if !text.contains(kind.dump_signature()) {
        bail!(
            "{} does not look like a {} dump (missing '{}')",
            path.display(),
            kind,
            kind.dump_signature()
        );
    }
    Ok(())
}

async fn run_restore(args: RestoreArgs, config: &DashConfig) -> Result<()> {
    let kind = args
        .target
        .or_else(|| infer_kind(&args.file))
        .ok_or_else(|| anyhow!("cannot infer database from '{}'; pass --target", args.file.display()))?;
    let db = config
        .database(kind)
        .ok_or_else(|| anyhow!("{} is not configured", kind))?;
    let parts = db.parts(kind)?;

    verify_backup(&args.file, kind)?;

    let file = args.file.clone();
    let pb = ui::spinner(format!("Restoring {} into {} '{}'", file.display(), kind, parts.database));
    let result = tokio::task::spawn_blocking(move || restore_from_file(kind, &parts, &file))
        .await
        .map_err(|e| anyhow!("restore task panicked: {}", e))
        .and_then(|r| r);

    match result {
        Ok(()) => {
            ui::finish_success(pb, "restore complete");
            tracing::info!(database = %kind, file = %args.file.display(), "restore complete");
            Ok(())
        }
        Err(e) => {
            ui::finish_error(pb, "restore failed");
            Err(e)
        }
    }
}

fn restore_from_file(kind: DbKind, parts: &ConnectionParts, path: &Path) -> Result<()> {
    let mut child = restore_command(kind, parts)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {}", kind.client_binary()))?;
    let stderr = drain_stderr(&mut child);

    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("{} stdin unavailable", kind.client_binary()))?;
        let file = File::open(path)?;
        let mut decoder = GzDecoder::new(BufReader::new(file));
        io::copy(&mut decoder, &mut stdin).context("failed to stream dump into client")?;
    }

    let status = child.wait()?;
    let stderr = stderr.join().unwrap_or_default();
    if !status.success() {
        bail!("{} exited with {}: {}", kind.client_binary(), status, stderr);
    }
    Ok(())
}

/// Backup files directly inside `dir` with their modification times
fn backup_files(dir: &Path) -> Vec<(PathBuf, SystemTime, u64)> {
    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(BACKUP_SUFFIX))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            Some((entry.into_path(), meta.modified().ok()?, meta.len()))
        })
        .collect()
}

fn run_list(dir: &Path) -> Result<()> {
    let mut files = backup_files(dir);
    if files.is_empty() {
        println!("No backups in {}", dir.display());
        return Ok(());
    }
    files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, modified, size) in files {
        let when: DateTime<Local> = modified.into();
        let kind = infer_kind(&path).map(|k| k.as_str()).unwrap_or("?");
        println!(
            "{:<11} {:>12} {}  {}",
            kind,
            size,
            when.format("%Y-%m-%d %H:%M"),
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        );
    }
    Ok(())
}

/// True when `modified` is older than `retention_days` before `now`
pub fn is_expired(modified: SystemTime, now: SystemTime, retention_days: u32) -> bool {
    let retention = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    now.duration_since(modified).map(|age| age > retention).unwrap_or(false)
}

fn run_cleanup(dir: &Path, retention_days: u32, dry_run: bool) -> Result<()> {
    let now = SystemTime::now();
    let mut removed = 0usize;
    for (path, modified, _) in backup_files(dir) {
        if !is_expired(modified, now, retention_days) {
            continue;
        }
        if dry_run {
            println!("would delete {}", path.display());
        } else {
            fs::remove_file(&path).with_context(|| format!("Failed to delete {}", path.display()))?;
            tracing::info!(path = %path.display(), "deleted expired backup");
        }
        removed += 1;
    }
    println!(
        "{} {} backup(s) older than {} days",
        if dry_run { "Would delete" } else { "Deleted" },
        removed,
        retention_days
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn write_gz(path: &Path, content: &str) {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn file_name_layout() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(
            backup_file_name(DbKind::Postgresql, "devops_analytics", at),
            "postgresql_devops_analytics_20240115_030405.sql.gz"
        );
    }

    #[test]
    fn kind_is_inferred_from_prefix() {
        assert_eq!(infer_kind(Path::new("/b/mysql_app_20240101_000000.sql.gz")), Some(DbKind::Mysql));
        assert_eq!(
            infer_kind(Path::new("postgresql_x_20240101_000000.sql.gz")),
            Some(DbKind::Postgresql)
        );
        assert_eq!(infer_kind(Path::new("dump.sql.gz")), None);
    }

    #[test]
    fn verify_accepts_real_banner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mysql_app.sql.gz");
        write_gz(&path, "-- MySQL dump 10.13  Distrib 8.0.36\n--\nCREATE TABLE users (id INT);\n");
        verify_backup(&path, DbKind::Mysql).unwrap();
        assert!(verify_backup(&path, DbKind::Postgresql).is_err());
    }

    #[test]
    fn verify_rejects_empty_and_non_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.sql.gz");
        write_gz(&empty, "");
        assert!(verify_backup(&empty, DbKind::Postgresql).is_err());

        let plain = dir.path().join("plain.sql.gz");
        fs::write(&plain, "-- PostgreSQL database dump").unwrap();
        assert!(verify_backup(&plain, DbKind::Postgresql).is_err());
    }

    #[test]
    fn expiry_uses_retention_days() {
        let now = SystemTime::now();
        let day = Duration::from_secs(86_400);
        assert!(is_expired(now - day * 8, now, 7));
        assert!(!is_expired(now - day * 6, now, 7));
        // clock skew: files from the future never expire
        assert!(!is_expired(now + day, now, 0));
    }

    #[test]
    fn cleanup_only_lists_backups() {
        let dir = tempfile::tempdir().unwrap();
        write_gz(&dir.path().join("mysql_a_20240101_000000.sql.gz"), "x");
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        let files = backup_files(dir.path());
        assert_eq!(files.len(), 1);
        run_cleanup(dir.path(), 0, true).unwrap();
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn missing_binary_is_detected() {
        let err = Command::new("devdash-no-such-binary")
            .spawn()
            .context("failed to start")
            .err()
            .unwrap();
        assert!(is_missing_binary(&err));
    }

    #[cfg(unix)]
    #[test]
    fn noisy_stderr_does_not_stall_the_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mysql_noisy.sql.gz");
        let mut command = Command::new("sh");
        // well past a pipe buffer of warnings before any dump output
        command
            .arg("-c")
            .arg("head -c 262144 /dev/zero | tr '\\0' w >&2; echo '-- MySQL dump 10.13'");

        let size = gzip_stdout(command, "sh", &path).unwrap();
        assert!(size > 0);
        verify_backup(&path, DbKind::Mysql).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn failed_dump_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mysql_broken.sql.gz");
        let mut command = Command::new("sh");
        command.arg("-c").arg("echo 'Access denied' >&2; exit 2");

        let err = gzip_stdout(command, "sh", &path).unwrap_err().to_string();
        assert!(err.contains("Access denied"), "{}", err);
    }
}
