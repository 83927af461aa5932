//! Metabase provisioning and checks
//!
//! `setup` logs in with the configured admin account and creates one
//! collection, a set of native-SQL questions and a dashboard per
//! [`DashboardKind`], against whichever MySQL and PostgreSQL databases the
//! instance already has connected. Collections and dashboards that already
//! exist by name are reused, so the command can be re-run safely.
//!
//! `check` runs the Metabase test suite and writes the same report files as
//! `devdash check` (it is also available there as `--phases metabase`).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use devdash_core::config::MetabaseSettings;
use devdash_core::{DashConfig, DbKind};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use super::check::{self, Phase, Report, Summary, TestResult, TestStatus};
use crate::ui;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_HEADER: &str = "X-Metabase-Session";
/// Columns in the dashboard layout grid
const GRID_COLUMNS: u32 = 18;
const DASHBOARD_DETAIL_LIMIT: usize = 5;
const QUERY_SAMPLE_LIMIT: usize = 3;
const REQUIRED_GROUPS: &[&str] = &["All Users", "Administrators"];
const TIMED_ENDPOINTS: &[&str] = &["/api/dashboard", "/api/card", "/api/database", "/api/user/current"];

#[derive(Parser, Debug)]
pub struct MetabaseArgs {
    #[command(subcommand)]
    pub command: MetabaseCommands,
}

#[derive(Subcommand, Debug)]
pub enum MetabaseCommands {
    /// Create collections, questions and dashboards
    Setup(SetupArgs),
    /// Test a running Metabase instance and write a report
    Check(SuiteArgs),
}

#[derive(Args, Debug)]
pub struct InstanceArgs {
    /// Metabase base URL (default: [metabase].url)
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Parser, Debug)]
pub struct SetupArgs {
    #[command(flatten)]
    pub instance: InstanceArgs,

    /// Dashboards to create
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [
            DashboardKind::Executive,
            DashboardKind::Sales,
            DashboardKind::Customers,
            DashboardKind::Realtime,
            DashboardKind::Marketing,
        ]
    )]
    pub dashboards: Vec<DashboardKind>,
}

#[derive(Parser, Debug)]
pub struct SuiteArgs {
    #[command(flatten)]
    pub instance: InstanceArgs,

    /// Where report.json and report.html are written (default: <[checks].report_dir>/metabase)
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

pub async fn run_metabase(args: MetabaseArgs, config: DashConfig) -> Result<()> {
    match args.command {
        MetabaseCommands::Setup(setup_args) => {
            let settings = with_url(&config.metabase, setup_args.instance.url);
            run_setup(&settings, setup_args.dashboards).await
        }
        MetabaseCommands::Check(suite_args) => {
            let settings = with_url(&config.metabase, suite_args.instance.url);
            let report_dir = suite_args
                .report_dir
                .unwrap_or_else(|| config.checks.report_dir.join("metabase"));
            let started_at = Utc::now();
            let results = check_suite(settings.clone()).await;
            let report = Report {
                base_url: settings.url,
                started_at,
                finished_at: Utc::now(),
                summary: Summary::from_results(&results),
                results,
            };
            check::finish(&report, &report_dir)
        }
    }
}

fn with_url(settings: &MetabaseSettings, url: Option<String>) -> MetabaseSettings {
    let mut settings = settings.clone();
    if let Some(url) = url {
        settings.url = url;
    }
    settings
}

// ---- Client ----

/// Thin JSON client that carries the session token after [`login`](Self::login)
pub struct MetabaseClient {
    http: reqwest::Client,
    base_url: String,
    session: Option<String>,
}

impl MetabaseClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and return the status with the JSON body (`Null` when
    /// the body is empty or not JSON)
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<(StatusCode, Value), reqwest::Error> {
        let mut request = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(ref session) = self.session {
            request = request.header(SESSION_HEADER, session);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    /// Like [`call`](Self::call) but any non-2xx status is an error
    async fn expect(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let (status, body) = self
            .call(method.clone(), path, body)
            .await
            .with_context(|| format!("{} {} failed", method, path))?;
        if !status.is_success() {
            bail!("{} {} returned HTTP {}: {}", method, path, status.as_u16(), error_message(&body));
        }
        Ok(body)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let body = self
            .expect(
                Method::POST,
                "/api/session",
                Some(&json!({ "username": username, "password": password })),
            )
            .await
            .context("Metabase login failed")?;
        let token = body["id"]
            .as_str()
            .ok_or_else(|| anyhow!("Metabase login returned no session id"))?;
        self.session = Some(token.to_string());
        Ok(())
    }
}

fn error_message(body: &Value) -> String {
    body["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// List endpoints answer either a bare array or `{"data": [...]}` depending
/// on the Metabase release
pub fn items(body: &Value) -> &[Value] {
    body.as_array()
        .or_else(|| body["data"].as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn id_of(body: &Value) -> Result<i64> {
    body["id"]
        .as_i64()
        .ok_or_else(|| anyhow!("response has no numeric id: {}", body))
}

// ---- Dashboard catalogue ----

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DashboardKind {
    Executive,
    Sales,
    Customers,
    Realtime,
    Marketing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visual {
    Scalar,
    Line,
    Bar,
    Pie,
    Table,
}

impl Visual {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Line => "line",
            Self::Bar => "bar",
            Self::Pie => "pie",
            Self::Table => "table",
        }
    }
}

/// A native-SQL question and its place on the dashboard grid
#[derive(Debug)]
pub struct Question {
    pub name: &'static str,
    pub description: &'static str,
    pub engine: DbKind,
    pub sql: &'static str,
    pub visual: Visual,
    pub row: u32,
    pub col: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct DashboardSpec {
    pub kind: DashboardKind,
    pub name: &'static str,
    pub description: &'static str,
    pub collection: &'static str,
    pub color: &'static str,
    /// Apply `[metabase].realtime_refresh_secs` as the cache TTL
    pub auto_refresh: bool,
    pub questions: &'static [Question],
}

const fn mysql(name: &'static str, description: &'static str, sql: &'static str, visual: Visual, at: (u32, u32, u32, u32)) -> Question {
    Question { name, description, engine: DbKind::Mysql, sql, visual, row: at.0, col: at.1, width: at.2, height: at.3 }
}

const fn pg(name: &'static str, description: &'static str, sql: &'static str, visual: Visual, at: (u32, u32, u32, u32)) -> Question {
    Question { name, description, engine: DbKind::Postgresql, sql, visual, row: at.0, col: at.1, width: at.2, height: at.3 }
}

pub static DASHBOARDS: &[DashboardSpec] = &[
    DashboardSpec {
        kind: DashboardKind::Executive,
        name: "Executive Overview",
        description: "Revenue, orders and engagement at a glance",
        collection: "Executive Dashboards",
        color: "#E74C3C",
        auto_refresh: false,
        questions: &[
            mysql(
                "Revenue Today",
                "Order revenue since midnight",
                "SELECT COALESCE(SUM(total_amount), 0) AS revenue FROM orders \
                 WHERE order_date >= CURDATE() AND status <> 'cancelled'",
                Visual::Scalar,
                (0, 0, 3, 3),
            ),
            mysql(
                "Orders Today",
                "Orders placed since midnight",
                "SELECT COUNT(*) AS orders FROM orders WHERE order_date >= CURDATE()",
                Visual::Scalar,
                (0, 3, 3, 3),
            ),
            mysql(
                "Active Customers Today",
                "Distinct customers who ordered today",
                "SELECT COUNT(DISTINCT user_id) AS customers FROM orders WHERE order_date >= CURDATE()",
                Visual::Scalar,
                (0, 6, 3, 3),
            ),
            pg(
                "Checkout Conversion Today",
                "Share of today's sessions that submitted the checkout form",
                "SELECT ROUND(100.0 * COUNT(DISTINCT session_id) FILTER (\
                 WHERE event_type = 'form_submit' AND event_data->>'form' = 'checkout') \
                 / NULLIF(COUNT(DISTINCT session_id), 0), 2) AS conversion_rate \
                 FROM analytics_events WHERE created_at >= CURRENT_DATE",
                Visual::Scalar,
                (0, 9, 3, 3),
            ),
            mysql(
                "Revenue Trend (30 days)",
                "Daily order revenue",
                "SELECT DATE(order_date) AS day, SUM(total_amount) AS revenue FROM orders \
                 WHERE order_date >= CURDATE() - INTERVAL 30 DAY AND status <> 'cancelled' \
                 GROUP BY DATE(order_date) ORDER BY day",
                Visual::Line,
                (3, 0, 12, 6),
            ),
        ],
    },
    DashboardSpec {
        kind: DashboardKind::Sales,
        name: "Sales Performance",
        description: "Products, categories and customer spend",
        collection: "Sales Analytics",
        color: "#27AE60",
        auto_refresh: false,
        questions: &[
            mysql(
                "Top Products",
                "Ten best-selling products by revenue",
                "SELECT p.name, SUM(oi.quantity * oi.unit_price) AS revenue \
                 FROM order_items oi JOIN products p ON p.id = oi.product_id \
                 GROUP BY p.id, p.name ORDER BY revenue DESC LIMIT 10",
                Visual::Bar,
                (0, 0, 8, 6),
            ),
            mysql(
                "Sales by Category",
                "Revenue share per product category",
                "SELECT COALESCE(p.category, 'uncategorised') AS category, \
                 SUM(oi.quantity * oi.unit_price) AS revenue \
                 FROM order_items oi JOIN products p ON p.id = oi.product_id \
                 GROUP BY category ORDER BY revenue DESC",
                Visual::Pie,
                (0, 8, 4, 6),
            ),
            mysql(
                "Customer Segments",
                "Customers grouped by lifetime spend",
                "SELECT segment, COUNT(*) AS customers FROM (\
                 SELECT user_id, CASE WHEN SUM(total_amount) >= 1000 THEN 'high value' \
                 WHEN SUM(total_amount) >= 250 THEN 'regular' ELSE 'occasional' END AS segment \
                 FROM orders GROUP BY user_id) spend GROUP BY segment ORDER BY customers DESC",
                Visual::Bar,
                (6, 0, 12, 6),
            ),
        ],
    },
    DashboardSpec {
        kind: DashboardKind::Customers,
        name: "Customer Analytics",
        description: "Acquisition, lifetime value and on-site behaviour",
        collection: "Customer Analytics",
        color: "#9B59B6",
        auto_refresh: false,
        questions: &[
            mysql(
                "Customer Acquisition",
                "New accounts per day over the last 90 days",
                "SELECT DATE(created_at) AS day, COUNT(*) AS new_customers FROM users \
                 WHERE deleted_at IS NULL AND created_at >= CURDATE() - INTERVAL 90 DAY \
                 GROUP BY DATE(created_at) ORDER BY day",
                Visual::Line,
                (0, 0, 12, 6),
            ),
            mysql(
                "Customer Lifetime Value",
                "Distribution of total spend per customer",
                "SELECT CASE WHEN spend < 100 THEN '< 100' WHEN spend < 500 THEN '100-499' \
                 WHEN spend < 1000 THEN '500-999' ELSE '1000+' END AS bucket, COUNT(*) AS customers \
                 FROM (SELECT user_id, SUM(total_amount) AS spend FROM orders GROUP BY user_id) totals \
                 GROUP BY bucket ORDER BY MIN(spend)",
                Visual::Bar,
                (6, 0, 6, 6),
            ),
            pg(
                "Behaviour Events (7 days)",
                "Tracked events by type",
                "SELECT event_type, COUNT(*) AS events FROM analytics_events \
                 WHERE created_at >= NOW() - INTERVAL '7 days' \
                 GROUP BY event_type ORDER BY events DESC",
                Visual::Bar,
                (6, 6, 6, 6),
            ),
        ],
    },
    DashboardSpec {
        kind: DashboardKind::Realtime,
        name: "Real-time Monitor",
        description: "Live traffic, system health and incoming orders",
        collection: "Real-time Monitoring",
        color: "#F39C12",
        auto_refresh: true,
        questions: &[
            pg(
                "Live Activity",
                "Events per minute over the last hour",
                "SELECT date_trunc('minute', created_at) AS minute, COUNT(*) AS events \
                 FROM analytics_events WHERE created_at >= NOW() - INTERVAL '1 hour' \
                 GROUP BY 1 ORDER BY 1",
                Visual::Line,
                (0, 0, 12, 6),
            ),
            pg(
                "System Performance",
                "Average CPU, memory and response time over the last hour",
                "SELECT metric_name, ROUND(AVG(value)::numeric, 2) AS average \
                 FROM performance_metrics \
                 WHERE metric_name IN ('cpu_usage', 'memory_usage', 'response_time') \
                 AND recorded_at >= NOW() - INTERVAL '1 hour' \
                 GROUP BY metric_name ORDER BY metric_name",
                Visual::Bar,
                (6, 0, 12, 6),
            ),
            mysql(
                "Recent Orders",
                "Orders from the last two hours",
                "SELECT o.order_number, u.username, o.status, o.total_amount, o.order_date \
                 FROM orders o JOIN users u ON u.id = o.user_id \
                 WHERE o.order_date >= NOW() - INTERVAL 2 HOUR \
                 ORDER BY o.order_date DESC LIMIT 50",
                Visual::Table,
                (12, 0, 12, 8),
            ),
        ],
    },
    DashboardSpec {
        kind: DashboardKind::Marketing,
        name: "Marketing Performance",
        description: "Where visitors come from and what they do",
        collection: "Marketing Analytics",
        color: "#E67E22",
        auto_refresh: false,
        questions: &[
            pg(
                "Audience by Device and Country",
                "Sessions and checkouts per device and country over 30 days",
                "SELECT COALESCE(device_type, 'unknown') AS device, COALESCE(country, 'unknown') AS country, \
                 COUNT(DISTINCT session_id) AS sessions, \
                 COUNT(*) FILTER (WHERE event_type = 'form_submit' AND event_data->>'form' = 'checkout') AS checkouts \
                 FROM analytics_events WHERE created_at >= NOW() - INTERVAL '30 days' \
                 GROUP BY 1, 2 ORDER BY sessions DESC",
                Visual::Table,
                (0, 0, 12, 8),
            ),
            pg(
                "Traffic Sources",
                "Page-view sessions by referrer over 30 days",
                "SELECT COALESCE(event_data->>'referrer', 'direct') AS source, \
                 COUNT(DISTINCT session_id) AS sessions FROM analytics_events \
                 WHERE event_type = 'page_view' AND created_at >= NOW() - INTERVAL '30 days' \
                 GROUP BY 1 ORDER BY 2 DESC",
                Visual::Pie,
                (8, 0, 6, 6),
            ),
        ],
    },
];

pub fn dashboard(kind: DashboardKind) -> &'static DashboardSpec {
    DASHBOARDS
        .iter()
        .find(|d| d.kind == kind)
        .unwrap_or(&DASHBOARDS[0])
}

pub fn collection_payload(spec: &DashboardSpec) -> Value {
    json!({
        "name": spec.collection,
        "description": format!("{} (managed by devdash)", spec.description),
        "color": spec.color,
        "parent_id": null,
    })
}

pub fn card_payload(question: &Question, database_id: i64, collection_id: i64) -> Value {
    json!({
        "name": question.name,
        "description": question.description,
        "database_id": database_id,
        "dataset_query": {
            "type": "native",
            "native": { "query": question.sql, "template-tags": {} },
            "database": database_id,
        },
        "display": question.visual.as_str(),
        "visualization_settings": {},
        "collection_id": collection_id,
    })
}

pub fn dashboard_payload(spec: &DashboardSpec, collection_id: i64) -> Value {
    json!({
        "name": spec.name,
        "description": spec.description,
        "collection_id": collection_id,
        "parameters": [],
    })
}

fn placement_payload(card_id: i64, question: &Question) -> Value {
    json!({
        "cardId": card_id,
        "row": question.row,
        "col": question.col,
        "sizeX": question.width,
        "sizeY": question.height,
        "parameter_mappings": [],
    })
}

/// Whole-layout form accepted by releases without the per-card endpoint;
/// negative ids mark new dashboard cards
fn dashcards_payload(placed: &[(i64, &Question)]) -> Value {
    let cards: Vec<Value> = placed
        .iter()
        .enumerate()
        .map(|(i, (card_id, q))| {
            json!({
                "id": -(i as i64 + 1),
                "card_id": card_id,
                "row": q.row,
                "col": q.col,
                "size_x": q.width,
                "size_y": q.height,
                "parameter_mappings": [],
            })
        })
        .collect();
    json!({ "dashcards": cards })
}

/// Metabase database ids for the two engines (first match wins)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineIds {
    pub mysql: Option<i64>,
    pub postgres: Option<i64>,
}

impl EngineIds {
    pub fn from_response(body: &Value) -> Self {
        let mut ids = Self::default();
        for db in items(body) {
            let Some(id) = db["id"].as_i64() else { continue };
            match db["engine"].as_str() {
                Some("mysql") => {
                    ids.mysql.get_or_insert(id);
                }
                Some("postgres") => {
                    ids.postgres.get_or_insert(id);
                }
                _ => {}
            }
        }
        ids
    }

    pub fn get(&self, kind: DbKind) -> Option<i64> {
        match kind {
            DbKind::Mysql => self.mysql,
            DbKind::Postgresql => self.postgres,
        }
    }
}

/// Live (not archived) collection with this exact name
pub fn find_collection(body: &Value, name: &str) -> Option<i64> {
    items(body)
        .iter()
        .filter(|c| !c["archived"].as_bool().unwrap_or(false))
        .find(|c| c["name"].as_str() == Some(name))
        .and_then(|c| c["id"].as_i64())
}

pub fn find_dashboard(body: &Value, name: &str, collection_id: i64) -> Option<i64> {
    items(body)
        .iter()
        .filter(|d| !d["archived"].as_bool().unwrap_or(false))
        .find(|d| d["name"].as_str() == Some(name) && d["collection_id"].as_i64() == Some(collection_id))
        .and_then(|d| d["id"].as_i64())
}

// ---- Setup ----

#[derive(Debug, PartialEq, Eq)]
pub enum Provisioned {
    Created { id: i64, cards: usize, skipped: usize },
    Existing(i64),
}

async fn run_setup(settings: &MetabaseSettings, kinds: Vec<DashboardKind>) -> Result<()> {
    let password = settings
        .password
        .as_deref()
        .context("no Metabase password: set METABASE_PASSWORD or [metabase].password")?;
    let mut client = MetabaseClient::new(&settings.url)?;
    client.login(&settings.username, password).await?;
    tracing::info!(url = %client.base_url(), user = %settings.username, "logged in to Metabase");

    let outcomes = setup(&client, kinds, settings.realtime_refresh_secs).await?;
    let mut failures = 0;
    for (kind, outcome) in outcomes {
        let name = dashboard(kind).name;
        match outcome {
            Ok(Provisioned::Created { id, cards, skipped }) => {
                println!("✓ {:<24} {} question(s)  {}/dashboard/{}", name, cards, client.base_url(), id);
                if skipped > 0 {
                    println!("  {} question(s) skipped: database not connected in Metabase", skipped);
                }
            }
            Ok(Provisioned::Existing(id)) => {
                println!("• {:<24} already exists  {}/dashboard/{}", name, client.base_url(), id);
            }
            Err(e) => {
                failures += 1;
                eprintln!("✗ {:<24} {:#}", name, e);
            }
        }
    }
    if failures > 0 {
        bail!("{} dashboard(s) failed", failures);
    }
    Ok(())
}

/// Provision each requested dashboard; one failing dashboard does not stop
/// the others
pub async fn setup(
    client: &MetabaseClient,
    mut kinds: Vec<DashboardKind>,
    refresh_secs: u32,
) -> Result<Vec<(DashboardKind, Result<Provisioned>)>> {
    kinds.sort();
    kinds.dedup();

    let engines = EngineIds::from_response(&client.expect(Method::GET, "/api/database", None).await?);
    if engines == EngineIds::default() {
        bail!("Metabase has no MySQL or PostgreSQL database connected; add them under Admin > Databases first");
    }
    let collections = client.expect(Method::GET, "/api/collection", None).await?;
    let dashboards = client.expect(Method::GET, "/api/dashboard", None).await?;

    let mut outcomes = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let spec = dashboard(kind);
        let pb = ui::spinner(format!("Creating {}...", spec.name));
        let outcome = provision(client, spec, engines, &collections, &dashboards, refresh_secs).await;
        match outcome {
            Ok(_) => ui::finish_success(pb, spec.name),
            Err(ref e) => {
                tracing::warn!(dashboard = spec.name, error = %e, "provisioning failed");
                ui::finish_error(pb, spec.name);
            }
        }
        outcomes.push((kind, outcome));
    }
    Ok(outcomes)
}

async fn provision(
    client: &MetabaseClient,
    spec: &DashboardSpec,
    engines: EngineIds,
    collections: &Value,
    dashboards: &Value,
    refresh_secs: u32,
) -> Result<Provisioned> {
    let collection_id = match find_collection(collections, spec.collection) {
        Some(id) => id,
        None => id_of(
            &client
                .expect(Method::POST, "/api/collection", Some(&collection_payload(spec)))
                .await?,
        )?,
    };
    if let Some(id) = find_dashboard(dashboards, spec.name, collection_id) {
        return Ok(Provisioned::Existing(id));
    }

    let dashboard_id = id_of(
        &client
            .expect(Method::POST, "/api/dashboard", Some(&dashboard_payload(spec, collection_id)))
            .await?,
    )?;

    let mut placed = Vec::new();
    let mut skipped = 0;
    for question in spec.questions {
        let Some(database_id) = engines.get(question.engine) else {
            tracing::warn!(question = question.name, engine = %question.engine, "no such database in Metabase, skipping");
            skipped += 1;
            continue;
        };
        let card = client
            .expect(Method::POST, "/api/card", Some(&card_payload(question, database_id, collection_id)))
            .await
            .with_context(|| format!("creating question '{}'", question.name))?;
        placed.push((id_of(&card)?, question));
    }
    place_cards(client, dashboard_id, &placed).await?;

    if spec.auto_refresh {
        client
            .expect(
                Method::PUT,
                &format!("/api/dashboard/{}", dashboard_id),
                Some(&json!({ "cache_ttl": refresh_secs })),
            )
            .await
            .context("setting auto-refresh")?;
    }

    Ok(Provisioned::Created {
        id: dashboard_id,
        cards: placed.len(),
        skipped,
    })
}

async fn place_cards(client: &MetabaseClient, dashboard_id: i64, placed: &[(i64, &Question)]) -> Result<()> {
    let cards_path = format!("/api/dashboard/{}/cards", dashboard_id);
    for (i, (card_id, question)) in placed.iter().enumerate() {
        let (status, body) = client
            .call(Method::POST, &cards_path, Some(&placement_payload(*card_id, question)))
            .await?;
        if i == 0 && (status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED) {
            tracing::debug!(dashboard_id, "per-card endpoint unavailable, sending the whole layout");
            client
                .expect(
                    Method::PUT,
                    &format!("/api/dashboard/{}", dashboard_id),
                    Some(&dashcards_payload(placed)),
                )
                .await?;
            return Ok(());
        }
        if !status.is_success() {
            bail!("placing '{}' returned HTTP {}: {}", question.name, status.as_u16(), error_message(&body));
        }
    }
    Ok(())
}

// ---- Check suite ----

fn outcome(name: &str, status: TestStatus, message: impl Into<String>, started: Instant) -> TestResult {
    TestResult::new(Phase::Metabase, name, status, message, started.elapsed())
}

/// Run the Metabase tests in order; an unreachable instance or a failed
/// login ends the run early
pub async fn check_suite(settings: MetabaseSettings) -> Vec<TestResult> {
    let started = Instant::now();
    let mut client = match MetabaseClient::new(&settings.url) {
        Ok(client) => client,
        Err(e) => return vec![outcome("http_client", TestStatus::Fail, format!("{:#}", e), started)],
    };

    let mut results = Vec::new();
    match client.call(Method::GET, "/api/health", None).await {
        Ok((status, _)) if status.is_success() => {
            results.push(outcome("availability", TestStatus::Pass, format!("HTTP {}", status.as_u16()), started));
        }
        Ok((status, _)) => {
            results.push(outcome("availability", TestStatus::Fail, format!("HTTP {}", status.as_u16()), started));
            return results;
        }
        Err(e) => {
            results.push(outcome("availability", TestStatus::Fail, e.to_string(), started));
            return results;
        }
    }

    let started = Instant::now();
    let Some(password) = settings.password.as_deref() else {
        results.push(outcome(
            "authentication",
            TestStatus::Fail,
            "no password configured (METABASE_PASSWORD or [metabase].password)",
            started,
        ));
        return results;
    };
    if let Err(e) = client.login(&settings.username, password).await {
        results.push(outcome("authentication", TestStatus::Fail, format!("{:#}", e), started));
        return results;
    }
    results.push(outcome(
        "authentication",
        TestStatus::Pass,
        format!("session issued for {}", settings.username),
        started,
    ));

    results.push(database_connections(&client).await);
    results.push(dashboards_present(&client).await);
    results.push(saved_queries(&client).await);
    results.push(user_management(&client).await);
    results.push(permission_groups(&client).await);
    for path in TIMED_ENDPOINTS {
        results.push(response_time(&client, path, settings.slow_request_ms).await);
    }
    results
}

/// GET a list endpoint, or the failed result to report instead
async fn fetch_list(client: &MetabaseClient, name: &str, path: &str, started: Instant) -> Result<Value, TestResult> {
    match client.call(Method::GET, path, None).await {
        Ok((status, body)) if status.is_success() => Ok(body),
        Ok((status, _)) if status == StatusCode::FORBIDDEN => Err(outcome(name, TestStatus::Warn, "HTTP 403: account lacks admin rights", started)),
        Ok((status, body)) => Err(outcome(
            name,
            TestStatus::Fail,
            format!("HTTP {}: {}", status.as_u16(), error_message(&body)),
            started,
        )),
        Err(e) => Err(outcome(name, TestStatus::Fail, e.to_string(), started)),
    }
}

async fn database_connections(client: &MetabaseClient) -> TestResult {
    const NAME: &str = "database_connections";
    let started = Instant::now();
    let body = match fetch_list(client, NAME, "/api/database", started).await {
        Ok(body) => body,
        Err(result) => return result,
    };
    let databases = items(&body);
    if databases.is_empty() {
        return outcome(NAME, TestStatus::Warn, "no databases connected", started);
    }

    let mut unreachable = Vec::new();
    let mut seen = Vec::new();
    for db in databases {
        let name = db["name"].as_str().unwrap_or("?").to_string();
        seen.push(json!({ "name": name, "engine": db["engine"] }));
        let Some(id) = db["id"].as_i64() else { continue };
        match client.call(Method::GET, &format!("/api/database/{}/schemas", id), None).await {
            Ok((status, _)) if status.is_success() => {}
            _ => unreachable.push(name),
        }
    }
    let result = if unreachable.is_empty() {
        outcome(NAME, TestStatus::Pass, format!("{} database(s) browsable", databases.len()), started)
    } else {
        outcome(NAME, TestStatus::Warn, format!("schemas unavailable for: {}", unreachable.join(", ")), started)
    };
    result.with_details(json!({ "databases": seen }))
}

/// Cards on a dashboard detail (`dashcards` on newer releases)
pub fn dashcard_count(detail: &Value) -> usize {
    detail["dashcards"]
        .as_array()
        .or_else(|| detail["ordered_cards"].as_array())
        .map_or(0, Vec::len)
}

async fn dashboards_present(client: &MetabaseClient) -> TestResult {
    const NAME: &str = "dashboards";
    let started = Instant::now();
    let body = match fetch_list(client, NAME, "/api/dashboard", started).await {
        Ok(body) => body,
        Err(result) => return result,
    };
    let dashboards = items(&body);
    if dashboards.is_empty() {
        return outcome(NAME, TestStatus::Warn, "no dashboards found (run `devdash metabase setup`)", started);
    }

    let mut cards = 0;
    let mut inspected = 0;
    for id in dashboards.iter().filter_map(|d| d["id"].as_i64()).take(DASHBOARD_DETAIL_LIMIT) {
        if let Ok((status, detail)) = client.call(Method::GET, &format!("/api/dashboard/{}", id), None).await {
            if status.is_success() {
                inspected += 1;
                cards += dashcard_count(&detail);
            }
        }
    }
    outcome(
        NAME,
        TestStatus::Pass,
        format!("{} dashboard(s), {} card(s) across {} inspected", dashboards.len(), cards, inspected),
        started,
    )
}

async fn saved_queries(client: &MetabaseClient) -> TestResult {
    const NAME: &str = "queries";
    let started = Instant::now();
    let body = match fetch_list(client, NAME, "/api/card", started).await {
        Ok(body) => body,
        Err(result) => return result,
    };
    let ids: Vec<i64> = items(&body)
        .iter()
        .filter_map(|c| c["id"].as_i64())
        .take(QUERY_SAMPLE_LIMIT)
        .collect();
    if ids.is_empty() {
        return outcome(NAME, TestStatus::Warn, "no saved questions to run", started);
    }

    let mut failed = Vec::new();
    for id in &ids {
        match client.call(Method::POST, &format!("/api/card/{}/query", id), None).await {
            // 202 means the query was accepted and is still streaming
            Ok((status, _)) if status.is_success() => {}
            Ok((status, _)) => failed.push(format!("card {}: HTTP {}", id, status.as_u16())),
            Err(e) => failed.push(format!("card {}: {}", id, e)),
        }
    }
    if failed.is_empty() {
        outcome(NAME, TestStatus::Pass, format!("{} question(s) executed", ids.len()), started)
    } else {
        outcome(NAME, TestStatus::Warn, failed.join("; "), started)
    }
}

/// (active, superusers) among listed accounts
pub fn user_counts(body: &Value) -> (usize, usize) {
    let users = items(body);
    let flag = |key: &str| users.iter().filter(|u| u[key].as_bool().unwrap_or(false)).count();
    (flag("is_active"), flag("is_superuser"))
}

async fn user_management(client: &MetabaseClient) -> TestResult {
    const NAME: &str = "user_management";
    let started = Instant::now();
    if let Err(result) = fetch_list(client, NAME, "/api/user/current", started).await {
        return result;
    }
    let body = match fetch_list(client, NAME, "/api/user", started).await {
        Ok(body) => body,
        Err(result) => return result,
    };
    let (active, superusers) = user_counts(&body);
    outcome(
        NAME,
        TestStatus::Pass,
        format!("{} active user(s), {} administrator(s)", active, superusers),
        started,
    )
    .with_details(json!({ "total": items(&body).len(), "active": active, "superusers": superusers }))
}

/// Built-in groups missing from a permission group listing
pub fn missing_groups(body: &Value) -> Vec<&'static str> {
    let names: Vec<&str> = items(body).iter().filter_map(|g| g["name"].as_str()).collect();
    REQUIRED_GROUPS
        .iter()
        .copied()
        .filter(|required| !names.contains(required))
        .collect()
}

async fn permission_groups(client: &MetabaseClient) -> TestResult {
    const NAME: &str = "permissions";
    let started = Instant::now();
    let body = match fetch_list(client, NAME, "/api/permissions/group", started).await {
        Ok(body) => body,
        Err(result) => return result,
    };
    let missing = missing_groups(&body);
    if missing.is_empty() {
        outcome(NAME, TestStatus::Pass, format!("{} permission group(s)", items(&body).len()), started)
    } else {
        outcome(NAME, TestStatus::Warn, format!("missing group(s): {}", missing.join(", ")), started)
    }
}

async fn response_time(client: &MetabaseClient, path: &str, threshold_ms: u64) -> TestResult {
    let name = format!("response_time {}", path);
    let started = Instant::now();
    match client.call(Method::GET, path, None).await {
        Ok((status, _)) => {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let (status, message) = check::classify(status.as_u16(), elapsed_ms, threshold_ms);
            outcome(&name, status, message, started)
        }
        Err(e) => outcome(&name, TestStatus::Fail, e.to_string(), started),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        path: String,
        session: Option<String>,
        body: Value,
    }

    type Routes = fn(&str, &str) -> (u16, Value);
    type Log = Arc<Mutex<Vec<Seen>>>;

    /// Minimal HTTP/1.1 stand-in for a Metabase instance; one request per
    /// connection, answered from `routes`
    async fn fake_metabase(routes: Routes) -> (String, Log) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(answer(socket, routes, seen.clone()));
            }
        });
        (format!("http://{}", addr), log)
    }

    async fn answer(mut socket: TcpStream, routes: Routes, log: Log) {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            data.extend_from_slice(&buf[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&data[..header_end]).to_string();
        let mut lines = head.lines();
        let mut request_line = lines.next().unwrap().split_whitespace();
        let method = request_line.next().unwrap().to_string();
        let path = request_line.next().unwrap().to_string();
        let mut length = 0;
        let mut session = None;
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                match key.trim().to_ascii_lowercase().as_str() {
                    "content-length" => length = value.trim().parse().unwrap(),
                    "x-metabase-session" => session = Some(value.trim().to_string()),
                    _ => {}
                }
            }
        }
        while data.len() < header_end + length {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }
        let body = serde_json::from_slice(&data[header_end..]).unwrap_or(Value::Null);

        let (status, reply) = routes(&method, &path);
        log.lock().unwrap().push(Seen { method, path, session, body });
        let payload = reply.to_string();
        let response = format!(
            "HTTP/1.1 {} OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            payload.len(),
            payload
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
    }

    fn settings(url: &str, password: Option<&str>) -> MetabaseSettings {
        MetabaseSettings {
            url: url.to_string(),
            password: password.map(str::to_string),
            ..Default::default()
        }
    }

    fn requests(log: &Log, method: &str, path: &str) -> Vec<Seen> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|s| s.method == method && s.path == path)
            .cloned()
            .collect()
    }

    fn status_of(results: &[TestResult], name: &str) -> TestStatus {
        results
            .iter()
            .find(|r| r.test_name == name)
            .unwrap_or_else(|| panic!("no result named {}", name))
            .status
    }

    // === Catalogue ===

    #[test]
    fn every_kind_has_one_dashboard() {
        for kind in DashboardKind::value_variants() {
            assert_eq!(DASHBOARDS.iter().filter(|d| d.kind == *kind).count(), 1, "{:?}", kind);
            assert_eq!(dashboard(*kind).kind, *kind);
        }
        let realtime: Vec<_> = DASHBOARDS.iter().filter(|d| d.auto_refresh).map(|d| d.kind).collect();
        assert_eq!(realtime, vec![DashboardKind::Realtime]);
    }

    #[test]
    fn layouts_fit_the_grid_without_overlap() {
        for spec in DASHBOARDS {
            assert!(!spec.questions.is_empty(), "{}", spec.name);
            for (i, a) in spec.questions.iter().enumerate() {
                assert!(a.col + a.width <= GRID_COLUMNS, "{} overflows", a.name);
                for b in &spec.questions[i + 1..] {
                    let apart = a.col + a.width <= b.col
                        || b.col + b.width <= a.col
                        || a.row + a.height <= b.row
                        || b.row + b.height <= a.row;
                    assert!(apart, "{} overlaps {} on {}", a.name, b.name, spec.name);
                }
            }
        }
    }

    #[test]
    fn questions_query_their_own_engine() {
        for question in DASHBOARDS.iter().flat_map(|d| d.questions) {
            let sql = question.sql.to_lowercase();
            assert!(sql.starts_with("select"), "{}", question.name);
            match question.engine {
                DbKind::Mysql => assert!(!sql.contains("analytics_events") && !sql.contains("performance_metrics")),
                DbKind::Postgresql => assert!(!sql.contains(" orders") && !sql.contains("curdate")),
            }
        }
    }

    #[test]
    fn card_payload_is_native_query() {
        let question = &dashboard(DashboardKind::Sales).questions[0];
        let payload = card_payload(question, 3, 7);
        assert_eq!(payload["dataset_query"]["type"], "native");
        assert_eq!(payload["dataset_query"]["database"], 3);
        assert_eq!(payload["dataset_query"]["native"]["query"], question.sql);
        assert_eq!(payload["display"], "bar");
        assert_eq!(payload["collection_id"], 7);
    }

    // === Response parsing ===

    #[test]
    fn engine_ids_from_either_list_shape() {
        let wrapped = json!({ "data": [
            { "id": 1, "engine": "h2" },
            { "id": 2, "engine": "mysql" },
            { "id": 3, "engine": "postgres" },
            { "id": 4, "engine": "mysql" },
        ]});
        assert_eq!(
            EngineIds::from_response(&wrapped),
            EngineIds { mysql: Some(2), postgres: Some(3) }
        );
        let bare = json!([{ "id": 9, "engine": "postgres" }]);
        assert_eq!(EngineIds::from_response(&bare).get(DbKind::Postgresql), Some(9));
        assert_eq!(EngineIds::from_response(&bare).get(DbKind::Mysql), None);
        assert_eq!(EngineIds::from_response(&Value::Null), EngineIds::default());
    }

    #[test]
    fn archived_collections_are_not_reused() {
        let body = json!([
            { "id": 1, "name": "Sales Analytics", "archived": true },
            { "id": 2, "name": "Sales Analytics" },
        ]);
        assert_eq!(find_collection(&body, "Sales Analytics"), Some(2));
        assert_eq!(find_collection(&body, "Marketing Analytics"), None);
    }

    #[test]
    fn dashboards_match_on_collection_too() {
        let body = json!([{ "id": 5, "name": "Sales Performance", "collection_id": 2 }]);
        assert_eq!(find_dashboard(&body, "Sales Performance", 2), Some(5));
        assert_eq!(find_dashboard(&body, "Sales Performance", 3), None);
    }

    #[test]
    fn dashcards_counted_on_old_and_new_releases() {
        assert_eq!(dashcard_count(&json!({ "dashcards": [{}, {}] })), 2);
        assert_eq!(dashcard_count(&json!({ "ordered_cards": [{}] })), 1);
        assert_eq!(dashcard_count(&json!({})), 0);
    }

    #[test]
    fn permission_groups_and_users() {
        assert_eq!(missing_groups(&json!([{ "name": "All Users" }])), vec!["Administrators"]);
        assert!(missing_groups(&json!([{ "name": "Administrators" }, { "name": "All Users" }])).is_empty());

        let users = json!({ "data": [
            { "is_active": true, "is_superuser": true },
            { "is_active": true, "is_superuser": false },
            { "is_active": false },
        ]});
        assert_eq!(user_counts(&users), (2, 1));
    }

    // === Against a stand-in instance ===

    fn healthy(method: &str, path: &str) -> (u16, Value) {
        match (method, path) {
            ("GET", "/api/health") => (200, json!({ "status": "ok" })),
            ("POST", "/api/session") => (200, json!({ "id": "session-token" })),
            ("GET", "/api/database") => (
                200,
                json!({ "data": [
                    { "id": 1, "name": "shop", "engine": "mysql" },
                    { "id": 2, "name": "analytics", "engine": "postgres" },
                ]}),
            ),
            ("GET", "/api/database/1/schemas") | ("GET", "/api/database/2/schemas") => (200, json!(["public"])),
            ("GET", "/api/dashboard") => (200, json!([])),
            ("GET", "/api/card") => (200, json!([{ "id": 5 }])),
            ("POST", "/api/card/5/query") => (202, json!({})),
            ("GET", "/api/user/current") => (200, json!({ "id": 1 })),
            ("GET", "/api/user") => (200, json!({ "data": [{ "is_active": true, "is_superuser": true }] })),
            ("GET", "/api/permissions/group") => (
                200,
                json!([{ "name": "All Users" }, { "name": "Administrators" }]),
            ),
            _ => (404, json!({ "message": "not found" })),
        }
    }

    #[tokio::test]
    async fn suite_passes_against_healthy_instance() {
        let (url, log) = fake_metabase(healthy).await;
        let results = check_suite(settings(&url, Some("pw"))).await;

        assert_eq!(status_of(&results, "availability"), TestStatus::Pass);
        assert_eq!(status_of(&results, "authentication"), TestStatus::Pass);
        assert_eq!(status_of(&results, "database_connections"), TestStatus::Pass);
        assert_eq!(status_of(&results, "dashboards"), TestStatus::Warn);
        assert_eq!(status_of(&results, "queries"), TestStatus::Pass);
        assert_eq!(status_of(&results, "user_management"), TestStatus::Pass);
        assert_eq!(status_of(&results, "permissions"), TestStatus::Pass);
        assert_eq!(results.len(), 7 + TIMED_ENDPOINTS.len());
        assert!(results.iter().all(|r| r.status != TestStatus::Fail && r.phase == Phase::Metabase));

        let login = &requests(&log, "POST", "/api/session")[0];
        assert_eq!(login.body["username"], "admin@devops.local");
        let authed = requests(&log, "GET", "/api/permissions/group");
        assert_eq!(authed[0].session.as_deref(), Some("session-token"));
    }

    #[tokio::test]
    async fn suite_stops_without_password() {
        let (url, _log) = fake_metabase(healthy).await;
        let results = check_suite(settings(&url, None)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(status_of(&results, "authentication"), TestStatus::Fail);
    }

    #[tokio::test]
    async fn suite_stops_when_unreachable() {
        let results = check_suite(settings("http://127.0.0.1:1", Some("pw"))).await;
        assert_eq!(results.len(), 1);
        assert_eq!(status_of(&results, "availability"), TestStatus::Fail);
    }

    async fn logged_in(url: &str) -> MetabaseClient {
        let mut client = MetabaseClient::new(url).unwrap();
        client.login("admin@devops.local", "pw").await.unwrap();
        client
    }

    fn mysql_only(method: &str, path: &str) -> (u16, Value) {
        match (method, path) {
            ("POST", "/api/session") => (200, json!({ "id": "tok" })),
            ("GET", "/api/database") => (200, json!([{ "id": 3, "engine": "mysql" }])),
            ("GET", "/api/collection") => (200, json!([{ "id": 7, "name": "Sales Analytics" }])),
            ("GET", "/api/dashboard") => (200, json!([])),
            ("POST", "/api/dashboard") => (200, json!({ "id": 9 })),
            ("POST", "/api/card") => (200, json!({ "id": 21 })),
            ("POST", "/api/dashboard/9/cards") => (200, json!({ "id": 1 })),
            _ => (404, json!({ "message": "not found" })),
        }
    }

    #[tokio::test]
    async fn setup_reuses_collection_and_places_cards() {
        let (url, log) = fake_metabase(mysql_only).await;
        let client = logged_in(&url).await;

        let outcomes = setup(&client, vec![DashboardKind::Sales], 30).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].1.as_ref().unwrap(),
            &Provisioned::Created { id: 9, cards: 3, skipped: 0 }
        );

        assert!(requests(&log, "POST", "/api/collection").is_empty());
        let cards = requests(&log, "POST", "/api/card");
        assert_eq!(cards.len(), 3);
        assert!(cards.iter().all(|c| c.body["collection_id"] == 7 && c.body["database_id"] == 3));
        assert!(cards.iter().all(|c| c.session.as_deref() == Some("tok")));
        let placements = requests(&log, "POST", "/api/dashboard/9/cards");
        assert_eq!(placements.len(), 3);
        assert_eq!(placements[0].body["cardId"], 21);
    }

    #[tokio::test]
    async fn setup_skips_questions_for_missing_engine() {
        let (url, log) = fake_metabase(mysql_only).await;
        let client = logged_in(&url).await;

        let outcomes = setup(&client, vec![DashboardKind::Executive], 30).await.unwrap();
        assert_eq!(
            outcomes[0].1.as_ref().unwrap(),
            &Provisioned::Created { id: 9, cards: 4, skipped: 1 }
        );
        // no collection named "Executive Dashboards" existed yet
        assert_eq!(requests(&log, "POST", "/api/collection").len(), 1);
    }

    fn existing(method: &str, path: &str) -> (u16, Value) {
        match (method, path) {
            ("GET", "/api/dashboard") => (
                200,
                json!([{ "id": 12, "name": "Sales Performance", "collection_id": 7 }]),
            ),
            _ => mysql_only(method, path),
        }
    }

    #[tokio::test]
    async fn setup_leaves_existing_dashboards_alone() {
        let (url, log) = fake_metabase(existing).await;
        let client = logged_in(&url).await;

        let outcomes = setup(&client, vec![DashboardKind::Sales, DashboardKind::Sales], 30)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].1.as_ref().unwrap(), &Provisioned::Existing(12));
        assert!(requests(&log, "POST", "/api/card").is_empty());
    }

    fn bulk_layout(method: &str, path: &str) -> (u16, Value) {
        match (method, path) {
            ("GET", "/api/database") => (
                200,
                json!([{ "id": 3, "engine": "mysql" }, { "id": 4, "engine": "postgres" }]),
            ),
            ("GET", "/api/collection") => (200, json!([])),
            ("POST", "/api/collection") => (200, json!({ "id": 8 })),
            ("POST", "/api/dashboard/9/cards") => (404, json!({ "message": "API endpoint does not exist." })),
            ("PUT", "/api/dashboard/9") => (200, json!({ "id": 9 })),
            _ => mysql_only(method, path),
        }
    }

    #[tokio::test]
    async fn setup_sends_whole_layout_when_card_endpoint_is_gone() {
        let (url, log) = fake_metabase(bulk_layout).await;
        let client = logged_in(&url).await;
        let placements = |s: &Seen| s.method == "POST" && s.path == "/api/dashboard/9/cards";
        let outcomes = setup(&client, vec![DashboardKind::Realtime], 45).await.unwrap();
        assert_eq!(
            outcomes[0].1.as_ref().unwrap(),
            &Provisioned::Created { id: 9, cards: 3, skipped: 0 }
        );
        assert_eq!(log.lock().unwrap().iter().filter(|&s| placements(s)).count(), 1);

        let updates = requests(&log, "PUT", "/api/dashboard/9");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].body["dashcards"].as_array().unwrap().len(), 3);
        assert_eq!(updates[1].body["cache_ttl"], 45);
    }

    #[tokio::test]
    async fn setup_requires_a_connected_database() {
        fn empty(method: &str, path: &str) -> (u16, Value) {
            match (method, path) {
                ("GET", "/api/database") => (200, json!({ "data": [] })),
                _ => mysql_only(method, path),
            }
        }
        let (url, _log) = fake_metabase(empty).await;
        let client = logged_in(&url).await;
        let err = setup(&client, vec![DashboardKind::Sales], 30).await.unwrap_err();
        assert!(err.to_string().contains("no MySQL or PostgreSQL database"));
    }
}
