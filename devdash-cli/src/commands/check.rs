//! End-to-end checks against a running server and its databases
//!
//! Phases run concurrently. Every test records PASS, FAIL or WARN with its
//! duration; the run writes `report.json` and `report.html` and fails when
//! any test failed.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use devdash_core::{DashConfig, DbKind};
use devdash_server::db::{connect_mysql_strict, connect_pg_strict};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{MySqlPool, PgPool};
use tokio::task::JoinSet;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PERFORMANCE_RUNS: usize = 5;
const CONCURRENT_CONNECTIONS: usize = 5;
const MAX_COUNT_VARIANCE_PCT: f64 = 5.0;

const MYSQL_TABLES: &[&str] = &["users", "products", "orders", "order_items", "notes"];
const PG_TABLES: &[&str] = &["users", "notes", "analytics_events", "performance_metrics"];

const ENDPOINTS: &[(&str, &str)] = &[
    ("health", "/health"),
    ("api_health", "/api/health"),
    ("list_users", "/api/users?limit=5"),
    ("list_products", "/api/products?limit=5"),
    ("list_orders", "/api/orders?limit=5"),
    ("dashboard", "/api/dashboard"),
    ("analytics_summary", "/api/analytics/summary"),
    ("latest_metrics", "/api/metrics/latest"),
    ("list_notes", "/api/notes?limit=5"),
];

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Server to test (default: [checks].base_url)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Phases to run
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Phase::Api, Phase::Database])]
    pub phases: Vec<Phase>,

    /// Where report.json and report.html are written (default: [checks].report_dir)
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Slow-response threshold in milliseconds (default: [checks].performance_threshold_ms)
    #[arg(long)]
    pub threshold_ms: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Api,
    Database,
    Metabase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Warn,
}

impl TestStatus {
    fn label(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Warn => "WARN",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub phase: Phase,
    pub test_name: String,
    pub status: TestStatus,
    pub message: String,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl TestResult {
    pub(crate) fn new(phase: Phase, name: impl Into<String>, status: TestStatus, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            phase,
            test_name: name.into(),
            status,
            message: message.into(),
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            details: Value::Null,
        }
    }

    pub(crate) fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub success_rate: f64,
    pub assessment: &'static str,
}

impl Summary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let count = |s: TestStatus| results.iter().filter(|r| r.status == s).count();
        let total = results.len();
        let passed = count(TestStatus::Pass);
        let success_rate = if total == 0 { 0.0 } else { passed as f64 / total as f64 * 100.0 };
        Self {
            total,
            passed,
            failed: count(TestStatus::Fail),
            warnings: count(TestStatus::Warn),
            success_rate,
            assessment: if success_rate >= 90.0 {
                "excellent"
            } else if success_rate >= 75.0 {
                "good"
            } else {
                "needs attention"
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: Summary,
    pub results: Vec<TestResult>,
}

pub async fn run_check(args: CheckArgs, config: DashConfig) -> Result<()> {
    let base_url = args
        .base_url
        .unwrap_or_else(|| config.checks.base_url.clone())
        .trim_end_matches('/')
        .to_string();
    let threshold_ms = args.threshold_ms.unwrap_or(config.checks.performance_threshold_ms);
    let report_dir = args.report_dir.unwrap_or_else(|| config.checks.report_dir.clone());

    let mut phases = args.phases;
    phases.sort();
    phases.dedup();

    let started_at = Utc::now();
    let mut set = JoinSet::new();
    for phase in phases {
        tracing::info!(?phase, "starting check phase");
        match phase {
            Phase::Api => {
                set.spawn(api_phase(base_url.clone(), threshold_ms));
            }
            Phase::Database => {
                set.spawn(database_phase(config.clone(), threshold_ms));
            }
            Phase::Metabase => {
                set.spawn(super::metabase::check_suite(config.metabase.clone()));
            }
        }
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        results.extend(joined.context("check phase panicked")?);
    }
    results.sort_by_key(|r| r.phase);

    let report = Report {
        base_url,
        started_at,
        finished_at: Utc::now(),
        summary: Summary::from_results(&results),
        results,
    };
    finish(&report, &report_dir)
}

/// Print the results table, write report.json/report.html and fail when any
/// test failed
pub(crate) fn finish(report: &Report, report_dir: &Path) -> Result<()> {
    for r in &report.results {
        println!("[{}] {:<8} {:<28} {:>8.1} ms  {}", r.status.label(), format!("{:?}", r.phase).to_lowercase(), r.test_name, r.duration_ms, r.message);
    }
    let s = &report.summary;
    println!(
        "\n{} tests: {} passed, {} failed, {} warnings ({:.1}% success, {})",
        s.total, s.passed, s.failed, s.warnings, s.success_rate, s.assessment
    );

    write_reports(report, report_dir)?;
    println!("reports written to {}", report_dir.display());

    if report.summary.failed > 0 {
        bail!("{} check(s) failed", report.summary.failed);
    }
    Ok(())
}

fn write_reports(report: &Report, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let json_path = dir.join("report.json");
    std::fs::write(&json_path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;
    let html_path = dir.join("report.html");
    std::fs::write(&html_path, render_html(report))
        .with_context(|| format!("Failed to write {}", html_path.display()))?;
    Ok(())
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_html(report: &Report) -> String {
    let s = &report.summary;
    let mut rows = String::new();
    for r in &report.results {
        rows.push_str(&format!(
            "<tr class=\"{}\"><td>{:?}</td><td>{}</td><td>{}</td><td>{:.1}</td><td>{}</td></tr>\n",
            r.status.label().to_lowercase(),
            r.phase,
            escape_html(&r.test_name),
            r.status.label(),
            r.duration_ms,
            escape_html(&r.message),
        ));
    }
    format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>devdash check report</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
table {{ border-collapse: collapse; width: 100%; }}
td, th {{ border: 1px solid #ccc; padding: 4px 8px; text-align: left; }}
tr.pass td:nth-child(3) {{ color: #1a7f37; }}
tr.fail td:nth-child(3) {{ color: #cf222e; font-weight: bold; }}
tr.warn td:nth-child(3) {{ color: #9a6700; }}
</style></head><body>
<h1>devdash check report</h1>
<p>Target: {base}<br>Started: {started}<br>Finished: {finished}</p>
<p><strong>{total}</strong> tests, {passed} passed, {failed} failed, {warnings} warnings ({rate:.1}% success, {assessment})</p>
<table><tr><th>Phase</th><th>Test</th><th>Status</th><th>ms</th><th>Message</th></tr>
{rows}</table>
</body></html>
"#,
        base = escape_html(&report.base_url),
        started = report.started_at.to_rfc3339(),
        finished = report.finished_at.to_rfc3339(),
        total = s.total,
        passed = s.passed,
        failed = s.failed,
        warnings = s.warnings,
        rate = s.success_rate,
        assessment = s.assessment,
        rows = rows,
    )
}

// ---- API phase ----

/// Status for a plain GET: 2xx passes (warns when slow), 503 warns because
/// the backing database is simply not configured, anything else fails.
pub fn classify(status: u16, elapsed_ms: f64, threshold_ms: u64) -> (TestStatus, String) {
    match status {
        200..=299 if elapsed_ms > threshold_ms as f64 => (
            TestStatus::Warn,
            format!("HTTP {} but slow: {:.0} ms (threshold {} ms)", status, elapsed_ms, threshold_ms),
        ),
        200..=299 => (TestStatus::Pass, format!("HTTP {}", status)),
        503 => (TestStatus::Warn, "HTTP 503: backing service unavailable".to_string()),
        _ => (TestStatus::Fail, format!("HTTP {}", status)),
    }
}

async fn send(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<&Value>,
) -> Result<(u16, Value), reqwest::Error> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(body);
    }
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, body))
}

async fn api_phase(base_url: String, threshold_ms: u64) -> Vec<TestResult> {
    let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            return vec![TestResult::new(Phase::Api, "http_client", TestStatus::Fail, e.to_string(), Duration::ZERO)]
        }
    };

    let mut results = Vec::new();
    for (name, path) in ENDPOINTS {
        let started = Instant::now();
        let url = format!("{}{}", base_url, path);
        let result = match send(&client, reqwest::Method::GET, &url, None).await {
            Ok((status, _)) => {
                let elapsed = started.elapsed();
                let (verdict, message) = classify(status, elapsed.as_secs_f64() * 1000.0, threshold_ms);
                TestResult::new(Phase::Api, *name, verdict, message, elapsed)
            }
            Err(e) => TestResult::new(Phase::Api, *name, TestStatus::Fail, format!("request failed: {}", e), started.elapsed()),
        };
        results.push(result.with_details(json!({ "path": path })));
    }

    results.extend(notes_lifecycle(&client, &base_url).await);
    results
}

/// Create, read, delete and re-delete a note; then fetch one that never existed.
async fn notes_lifecycle(client: &reqwest::Client, base_url: &str) -> Vec<TestResult> {
    use reqwest::Method;

    let mut results = Vec::new();
    let notes_url = format!("{}/api/notes", base_url);
    let started = Instant::now();
    let body = json!({
        "title": "devdash check",
        "content": "created by devdash check; safe to delete",
        "tags": ["devdash-check"],
    });

    let id = match send(client, Method::POST, &notes_url, Some(&body)).await {
        Ok((201, created)) => match created["data"]["id"].as_str() {
            Some(id) => {
                results.push(TestResult::new(Phase::Api, "create_note", TestStatus::Pass, "HTTP 201", started.elapsed()));
                id.to_string()
            }
            None => {
                results.push(TestResult::new(Phase::Api, "create_note", TestStatus::Fail, "response has no data.id", started.elapsed()));
                return results;
            }
        },
        Ok((503, _)) => {
            results.push(TestResult::new(Phase::Api, "create_note", TestStatus::Warn, "notes store unavailable; lifecycle skipped", started.elapsed()));
            return results;
        }
        Ok((status, _)) => {
            results.push(TestResult::new(Phase::Api, "create_note", TestStatus::Fail, format!("expected 201, got {}", status), started.elapsed()));
            return results;
        }
        Err(e) => {
            results.push(TestResult::new(Phase::Api, "create_note", TestStatus::Fail, e.to_string(), started.elapsed()));
            return results;
        }
    };

    let note_url = format!("{}/{}", notes_url, id);
    let steps: [(&str, Method, u16); 3] = [
        ("get_note", Method::GET, 200),
        ("delete_note", Method::DELETE, 200),
        ("delete_note_again", Method::DELETE, 404),
    ];
    for (name, method, expected) in steps {
        results.push(expect_status(client, name, method, &note_url, expected).await);
    }

    let missing_url = format!("{}/devdash-check-missing-{}", notes_url, Utc::now().timestamp_micros());
    results.push(expect_status(client, "get_missing_note", Method::GET, &missing_url, 404).await);
    results
}

async fn expect_status(client: &reqwest::Client, name: &str, method: reqwest::Method, url: &str, expected: u16) -> TestResult {
    let started = Instant::now();
    match send(client, method, url, None).await {
        Ok((status, _)) if status == expected => {
            TestResult::new(Phase::Api, name, TestStatus::Pass, format!("HTTP {}", status), started.elapsed())
        }
        Ok((status, _)) => TestResult::new(
            Phase::Api,
            name,
            TestStatus::Fail,
            format!("expected {}, got {}", expected, status),
            started.elapsed(),
        ),
        Err(e) => TestResult::new(Phase::Api, name, TestStatus::Fail, e.to_string(), started.elapsed()),
    }
}

// ---- database phase ----

pub fn missing_tables<'a>(required: &[&'a str], present: &[String]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|t| !present.iter().any(|p| p == t))
        .collect()
}

/// Relative difference between two counts, as a percentage of the larger.
pub fn count_variance_pct(a: i64, b: i64) -> f64 {
    let max = a.max(b);
    if max <= 0 {
        return 0.0;
    }
    (a - b).abs() as f64 * 100.0 / max as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn performance_result(kind: DbKind, timings: Result<Vec<f64>, sqlx::Error>, threshold_ms: u64, started: Instant) -> TestResult {
    let name = format!("{}_query_performance", kind);
    match timings {
        Ok(timings) => {
            let avg = mean(&timings);
            let status = if avg < threshold_ms as f64 { TestStatus::Pass } else { TestStatus::Warn };
            TestResult::new(
                Phase::Database,
                name,
                status,
                format!("avg {:.1} ms over {} runs (threshold {} ms)", avg, timings.len(), threshold_ms),
                started.elapsed(),
            )
            .with_details(json!({ "timings_ms": timings }))
        }
        Err(e) => TestResult::new(Phase::Database, name, TestStatus::Fail, e.to_string(), started.elapsed()),
    }
}

fn schema_result(kind: DbKind, present: Result<Vec<String>, sqlx::Error>, required: &[&str], started: Instant) -> TestResult {
    let name = format!("{}_schema", kind);
    match present {
        Ok(present) => {
            let missing = missing_tables(required, &present);
            if missing.is_empty() {
                TestResult::new(Phase::Database, name, TestStatus::Pass, format!("{} required tables present", required.len()), started.elapsed())
            } else {
                TestResult::new(Phase::Database, name, TestStatus::Fail, format!("missing tables: {}", missing.join(", ")), started.elapsed())
            }
        }
        Err(e) => TestResult::new(Phase::Database, name, TestStatus::Fail, e.to_string(), started.elapsed()),
    }
}

async fn database_phase(config: DashConfig, threshold_ms: u64) -> Vec<TestResult> {
    let mut results = Vec::new();
    let mut mysql = None;
    let mut postgres = None;

    for kind in DbKind::ALL {
        let started = Instant::now();
        let Some(db) = config.database(kind) else {
            results.push(TestResult::new(Phase::Database, format!("{}_connectivity", kind), TestStatus::Warn, "not configured; skipped", Duration::ZERO));
            continue;
        };
        let connected = match kind {
            DbKind::Mysql => connect_mysql_strict(db).await.map(|p| mysql = Some(p)),
            DbKind::Postgresql => connect_pg_strict(db).await.map(|p| postgres = Some(p)),
        };
        results.push(match connected {
            Ok(()) => TestResult::new(Phase::Database, format!("{}_connectivity", kind), TestStatus::Pass, "SELECT 1 succeeded", started.elapsed()),
            Err(e) => TestResult::new(Phase::Database, format!("{}_connectivity", kind), TestStatus::Fail, e.to_string(), started.elapsed()),
        });
    }

    if let Some(ref pool) = mysql {
        results.extend(mysql_checks(pool, threshold_ms).await);
    }
    if let Some(ref pool) = postgres {
        results.extend(pg_checks(pool, threshold_ms).await);
    }
    if let (Some(my), Some(pg)) = (&mysql, &postgres) {
        results.push(cross_database_users(my, pg).await);
    }

    if let Some(pool) = mysql {
        pool.close().await;
    }
    if let Some(pool) = postgres {
        pool.close().await;
    }
    results
}

async fn mysql_checks(pool: &MySqlPool, threshold_ms: u64) -> Vec<TestResult> {
    let mut results = Vec::new();

    let started = Instant::now();
    let present: Result<Vec<String>, _> = sqlx::query_scalar(
        "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE()",
    )
    .fetch_all(pool)
    .await;
    results.push(schema_result(DbKind::Mysql, present, MYSQL_TABLES, started));

    let started = Instant::now();
    let orphans: Result<i64, _> = sqlx::query_scalar(
        "SELECT CAST(COUNT(*) AS SIGNED) FROM orders o LEFT JOIN users u ON u.id = o.user_id WHERE u.id IS NULL",
    )
    .fetch_one(pool)
    .await;
    results.push(match orphans {
        Ok(0) => TestResult::new(Phase::Database, "mysql_orphaned_orders", TestStatus::Pass, "every order has a user", started.elapsed()),
        Ok(n) => TestResult::new(Phase::Database, "mysql_orphaned_orders", TestStatus::Warn, format!("{} order(s) reference missing users", n), started.elapsed()),
        Err(e) => TestResult::new(Phase::Database, "mysql_orphaned_orders", TestStatus::Fail, e.to_string(), started.elapsed()),
    });

    let started = Instant::now();
    let mut timings = Vec::with_capacity(PERFORMANCE_RUNS);
    let mut outcome = Ok(());
    for _ in 0..PERFORMANCE_RUNS {
        let run = Instant::now();
        if let Err(e) = sqlx::query(
            "SELECT o.id, o.order_number, u.username FROM orders o \
             JOIN users u ON u.id = o.user_id ORDER BY o.created_at DESC LIMIT 50",
        )
        .fetch_all(pool)
        .await
        {
            outcome = Err(e);
            break;
        }
        timings.push(run.elapsed().as_secs_f64() * 1000.0);
    }
    results.push(performance_result(DbKind::Mysql, outcome.map(|_| timings), threshold_ms, started));

    let started = Instant::now();
    let mut set = JoinSet::new();
    for _ in 0..CONCURRENT_CONNECTIONS {
        let pool = pool.clone();
        set.spawn(async move { sqlx::query("SELECT SLEEP(0.1)").execute(&pool).await.map(|_| ()) });
    }
    results.push(concurrency_result(DbKind::Mysql, set, started).await);
    results
}

async fn pg_checks(pool: &PgPool, threshold_ms: u64) -> Vec<TestResult> {
    let mut results = Vec::new();

    let started = Instant::now();
    let present: Result<Vec<String>, _> = sqlx::query_scalar("SELECT tablename::text FROM pg_tables WHERE schemaname = current_schema()")
        .fetch_all(pool)
        .await;
    results.push(schema_result(DbKind::Postgresql, present, PG_TABLES, started));

    let started = Instant::now();
    let mut timings = Vec::with_capacity(PERFORMANCE_RUNS);
    let mut outcome = Ok(());
    for _ in 0..PERFORMANCE_RUNS {
        let run = Instant::now();
        if let Err(e) = sqlx::query(
            "SELECT event_type, COUNT(*) FROM analytics_events \
             WHERE created_at > NOW() - INTERVAL '24 hours' GROUP BY event_type",
        )
        .fetch_all(pool)
        .await
        {
            outcome = Err(e);
            break;
        }
        timings.push(run.elapsed().as_secs_f64() * 1000.0);
    }
    results.push(performance_result(DbKind::Postgresql, outcome.map(|_| timings), threshold_ms, started));

    let started = Instant::now();
    let mut set = JoinSet::new();
    for _ in 0..CONCURRENT_CONNECTIONS {
        let pool = pool.clone();
        set.spawn(async move { sqlx::query("SELECT pg_sleep(0.1)").execute(&pool).await.map(|_| ()) });
    }
    results.push(concurrency_result(DbKind::Postgresql, set, started).await);
    results
}

async fn concurrency_result(kind: DbKind, mut set: JoinSet<Result<(), sqlx::Error>>, started: Instant) -> TestResult {
    let mut ok = 0usize;
    let mut errors = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => ok += 1,
            Ok(Err(e)) => errors.push(e.to_string()),
            Err(e) => errors.push(e.to_string()),
        }
    }
    let name = format!("{}_connection_pool", kind);
    if errors.is_empty() {
        TestResult::new(Phase::Database, name, TestStatus::Pass, format!("{} concurrent queries succeeded", ok), started.elapsed())
    } else {
        TestResult::new(
            Phase::Database,
            name,
            TestStatus::Fail,
            format!("{}/{} concurrent queries failed", errors.len(), ok + errors.len()),
            started.elapsed(),
        )
        .with_details(json!({ "errors": errors }))
    }
}

/// Users live in both engines; their counts should roughly agree.
async fn cross_database_users(mysql: &MySqlPool, pg: &PgPool) -> TestResult {
    let started = Instant::now();
    let my: Result<i64, _> = sqlx::query_scalar("SELECT CAST(COUNT(*) AS SIGNED) FROM users WHERE deleted_at IS NULL")
        .fetch_one(mysql)
        .await;
    let pg: Result<i64, _> = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(pg).await;
    match (my, pg) {
        (Ok(my), Ok(pg)) => {
            let variance = count_variance_pct(my, pg);
            let status = if variance <= MAX_COUNT_VARIANCE_PCT { TestStatus::Pass } else { TestStatus::Warn };
            TestResult::new(
                Phase::Database,
                "cross_database_users",
                status,
                format!("mysql {} vs postgresql {} ({:.1}% apart)", my, pg, variance),
                started.elapsed(),
            )
        }
        (Err(e), _) | (_, Err(e)) => {
            TestResult::new(Phase::Database, "cross_database_users", TestStatus::Fail, e.to_string(), started.elapsed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: TestStatus) -> TestResult {
        TestResult::new(Phase::Api, "t", status, "", Duration::ZERO)
    }

    #[test]
    fn classify_statuses() {
        assert_eq!(classify(200, 12.0, 1000).0, TestStatus::Pass);
        assert_eq!(classify(200, 1500.0, 1000).0, TestStatus::Warn);
        assert_eq!(classify(503, 5.0, 1000).0, TestStatus::Warn);
        assert_eq!(classify(500, 5.0, 1000).0, TestStatus::Fail);
        assert_eq!(classify(404, 5.0, 1000).0, TestStatus::Fail);
    }

    #[test]
    fn summary_counts_and_grades() {
        let mut results: Vec<_> = (0..9).map(|_| result(TestStatus::Pass)).collect();
        results.push(result(TestStatus::Warn));
        let s = Summary::from_results(&results);
        assert_eq!((s.total, s.passed, s.failed, s.warnings), (10, 9, 0, 1));
        assert_eq!(s.assessment, "excellent");

        results.push(result(TestStatus::Fail));
        results.push(result(TestStatus::Fail));
        assert_eq!(Summary::from_results(&results).assessment, "good");
        assert_eq!(Summary::from_results(&[]).success_rate, 0.0);
    }

    #[test]
    fn missing_tables_are_listed() {
        let present = vec!["users".to_string(), "orders".to_string()];
        assert_eq!(missing_tables(&["users", "orders", "products"], &present), vec!["products"]);
    }

    #[test]
    fn variance_between_counts() {
        assert_eq!(count_variance_pct(100, 100), 0.0);
        assert_eq!(count_variance_pct(100, 90), 10.0);
        assert_eq!(count_variance_pct(0, 0), 0.0);
    }

    #[test]
    fn html_report_escapes_messages() {
        let mut r = result(TestStatus::Fail);
        r.message = "<script>alert('x')</script>".into();
        let report = Report {
            base_url: "http://localhost:3000".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            summary: Summary::from_results(std::slice::from_ref(&r)),
            results: vec![r],
        };
        let html = render_html(&report);
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn reports_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report {
            base_url: "http://localhost:3000".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            summary: Summary::from_results(&[]),
            results: vec![],
        };
        write_reports(&report, dir.path()).unwrap();
        let json: Value = serde_json::from_str(&std::fs::read_to_string(dir.path().join("report.json")).unwrap()).unwrap();
        assert_eq!(json["summary"]["total"], 0);
        assert!(dir.path().join("report.html").exists());
    }

    #[tokio::test]
    async fn unconfigured_databases_warn() {
        let results = database_phase(DashConfig::default(), 1000).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == TestStatus::Warn));
    }
}
