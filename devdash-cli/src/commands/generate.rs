//! Synthetic BI data
//!
//! Each batch places a few orders (MySQL), tracks a burst of analytics
//! events and records one sample of every dashboard metric (PostgreSQL).
//! Runs until `--count` batches are done, Ctrl+C or SIGTERM.

use std::time::Duration;

use anyhow::Result;
use chrono::{Timelike, Utc};
use clap::Parser;
use devdash_core::models::{
    MetricSource, MetricType, NewEvent, NewMetric, NewOrder, OrderItemRequest, OrderStatus, PaymentStatus,
};
use devdash_core::DashConfig;
use devdash_server::db::repos::{AnalyticsRepo, MetricRepo, OrderRepo, ProductRepo, UserRepo};
use devdash_server::http::shutdown_signal;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sqlx::{MySqlPool, PgPool};

use super::{connect, Databases, Target};

const SAMPLE_IDS: i64 = 100;

const COUNTRIES: &[&str] = &["US", "CA", "GB", "DE", "FR", "AU", "JP", "BR"];
const PAGES: &[&str] = &[
    "/dashboard", "/analytics", "/monitoring", "/settings", "/products", "/orders", "/users", "/reports",
];
const EVENT_TYPES: &[&str] = &[
    "page_view", "click", "scroll", "form_submit", "download", "search", "filter_change", "chart_interaction",
];
const DEVICES: &[&str] = &["desktop", "mobile", "tablet"];
const BROWSERS: &[&str] = &["Chrome", "Firefox", "Safari", "Edge"];
const SYSTEMS: &[&str] = &["Windows", "macOS", "Linux", "iOS", "Android"];
const PAYMENT_METHODS: &[&str] = &["credit_card", "debit_card", "paypal"];
const ORDER_STATUSES: &[(OrderStatus, u32)] = &[
    (OrderStatus::Pending, 10),
    (OrderStatus::Processing, 30),
    (OrderStatus::Shipped, 40),
    (OrderStatus::Delivered, 20),
];

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Seconds between batches
    #[arg(long, default_value_t = 30)]
    pub interval: u64,

    /// Stop after this many batches (default: run until Ctrl+C)
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchStats {
    orders: usize,
    events: usize,
    metrics: usize,
}

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn cities(country: &str) -> &'static [&'static str] {
    match country {
        "US" => &["New York", "San Francisco", "Chicago", "Austin", "Seattle"],
        "CA" => &["Toronto", "Vancouver", "Montreal"],
        "GB" => &["London", "Manchester", "Edinburgh"],
        "DE" => &["Berlin", "Munich", "Hamburg"],
        "FR" => &["Paris", "Lyon", "Marseille"],
        "AU" => &["Sydney", "Melbourne", "Brisbane"],
        "JP" => &["Tokyo", "Osaka", "Kyoto"],
        "BR" => &["São Paulo", "Rio de Janeiro", "Brasília"],
        _ => &["Unknown"],
    }
}

/// An order to place plus the status it should end in
#[derive(Debug, Clone)]
pub struct OrderPlan {
    pub order: NewOrder,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

pub fn order_plans(rng: &mut StdRng, user_ids: &[i64], product_ids: &[i64]) -> Vec<OrderPlan> {
    if user_ids.is_empty() || product_ids.is_empty() {
        return Vec::new();
    }
    let Ok(statuses) = WeightedIndex::new(ORDER_STATUSES.iter().map(|(_, w)| *w)) else {
        return Vec::new();
    };
    let count = rng.gen_range(1..=3);
    (0..count)
        .map(|_| {
            let user_id = user_ids.choose(rng).copied().unwrap_or_default();
            let item_count = rng.gen_range(1..=5usize).min(product_ids.len());
            let items = product_ids
                .choose_multiple(rng, item_count)
                .copied()
                .collect::<Vec<_>>()
                .into_iter()
                .map(|product_id| OrderItemRequest {
                    product_id,
                    quantity: rng.gen_range(1..=3),
                })
                .collect();
            let status = ORDER_STATUSES[statuses.sample(rng)].0;
            let payment_status = match status {
                OrderStatus::Shipped | OrderStatus::Delivered => PaymentStatus::Completed,
                _ if rng.gen_bool(0.5) => PaymentStatus::Completed,
                _ => PaymentStatus::Pending,
            };
            OrderPlan {
                order: NewOrder {
                    user_id,
                    items,
                    payment_method: Some(pick(rng, PAYMENT_METHODS).to_string()),
                },
                status,
                payment_status,
            }
        })
        .collect()
}

fn event_data(rng: &mut StdRng, event_type: &str) -> Value {
    match event_type {
        "page_view" => json!({
            "load_time_ms": rng.gen_range(200..3000),
            "referrer": pick(rng, &["direct", "google", "newsletter", "slack"]),
        }),
        "click" => json!({
            "element": pick(rng, &["button", "link", "nav", "card"]),
            "x": rng.gen_range(0..1920),
            "y": rng.gen_range(0..1080),
        }),
        "scroll" => json!({ "depth_percent": rng.gen_range(10..=100) }),
        "form_submit" => json!({
            "form": pick(rng, &["login", "search", "settings", "checkout"]),
            "success": rng.gen_bool(0.9),
        }),
        "download" => json!({
            "file_type": pick(rng, &["pdf", "csv", "xlsx"]),
            "size_kb": rng.gen_range(10..5000),
        }),
        "search" => json!({
            "query": pick(rng, &["latency", "orders today", "cpu", "revenue", "errors"]),
            "results": rng.gen_range(0..50),
        }),
        "filter_change" => json!({
            "filter": pick(rng, &["date_range", "status", "category"]),
            "value": pick(rng, &["7d", "30d", "active", "electronics"]),
        }),
        "chart_interaction" => json!({
            "chart": pick(rng, &["revenue", "traffic", "orders"]),
            "action": pick(rng, &["hover", "zoom", "click"]),
        }),
        _ => json!({}),
    }
}

pub fn random_event(rng: &mut StdRng) -> NewEvent {
    let event_type = pick(rng, EVENT_TYPES);
    let page = pick(rng, PAGES);
    let country = pick(rng, COUNTRIES);
    NewEvent {
        session_id: format!("sess_{}", rng.gen_range(1_000_000..=9_999_999)),
        user_id: rng.gen_bool(0.7).then(|| rng.gen_range(1..=10)),
        event_type: event_type.to_string(),
        event_name: Some(format!("{} {}", event_type, page)),
        page_url: Some(page.to_string()),
        device_type: Some(pick(rng, DEVICES).to_string()),
        browser: Some(pick(rng, BROWSERS).to_string()),
        operating_system: Some(pick(rng, SYSTEMS).to_string()),
        country: Some(country.to_string()),
        city: Some(pick(rng, cities(country)).to_string()),
        event_data: event_data(rng, event_type),
    }
}

pub fn random_metrics(rng: &mut StdRng, hour: u32) -> Vec<NewMetric> {
    let metric = |name: &str, metric_type, value: f64, unit: &str, source| NewMetric {
        metric_name: name.to_string(),
        metric_type,
        value: (value * 100.0).round() / 100.0,
        unit: Some(unit.to_string()),
        source,
        tags: json!({ "generator": "devdash" }),
    };
    let revenue = 1000.0 + f64::from(hour) * 50.0 + rng.gen_range(-200.0..400.0);
    vec![
        metric("cpu_usage", MetricType::Gauge, rng.gen_range(20.0..80.0), "%", MetricSource::System),
        metric("memory_usage", MetricType::Gauge, rng.gen_range(40.0..85.0), "%", MetricSource::System),
        metric("disk_usage", MetricType::Gauge, rng.gen_range(30.0..70.0), "%", MetricSource::System),
        metric("response_time", MetricType::Histogram, rng.gen_range(50.0..500.0), "ms", MetricSource::Application),
        metric("request_count", MetricType::Counter, f64::from(rng.gen_range(10..=100u32)), "requests", MetricSource::Application),
        metric("active_connections", MetricType::Gauge, f64::from(rng.gen_range(20..=100u32)), "connections", MetricSource::Application),
        metric("revenue_per_hour", MetricType::Gauge, revenue, "USD", MetricSource::Business),
        metric("conversion_rate", MetricType::Gauge, rng.gen_range(2.5..4.5), "%", MetricSource::Business),
    ]
}

async fn place_orders(pool: &MySqlPool, rng: &mut StdRng) -> usize {
    let user_ids = UserRepo::new(pool).sample_ids(SAMPLE_IDS).await;
    let product_ids = ProductRepo::new(pool).sample_ids(SAMPLE_IDS).await;
    let (user_ids, product_ids) = match (user_ids, product_ids) {
        (Ok(u), Ok(p)) => (u, p),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "cannot sample users/products");
            return 0;
        }
    };
    if user_ids.is_empty() || product_ids.is_empty() {
        tracing::warn!("no active users or products; skipping orders");
        return 0;
    }

    let repo = OrderRepo::new(pool);
    let mut placed = 0;
    for plan in order_plans(rng, &user_ids, &product_ids) {
        let order = match repo.create(plan.order).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(error = %e, "order insert failed");
                continue;
            }
        };
        placed += 1;
        if plan.status != OrderStatus::Pending {
            if let Err(e) = repo.update_status(order.id, plan.status, Some(plan.payment_status)).await {
                tracing::warn!(order_id = order.id, error = %e, "order status update failed");
            }
        }
    }
    placed
}

async fn track_activity(pool: &PgPool, rng: &mut StdRng) -> (usize, usize) {
    let analytics = AnalyticsRepo::new(pool);
    let mut events = 0;
    for _ in 0..rng.gen_range(5..=15) {
        match analytics.track(random_event(rng)).await {
            Ok(_) => events += 1,
            Err(e) => tracing::warn!(error = %e, "event insert failed"),
        }
    }

    let metrics = match MetricRepo::new(pool).record(random_metrics(rng, Utc::now().hour())).await {
        Ok(recorded) => recorded.len(),
        Err(e) => {
            tracing::warn!(error = %e, "metric insert failed");
            0
        }
    };
    (events, metrics)
}

async fn generate_batch(dbs: &Databases, rng: &mut StdRng) -> BatchStats {
    let mut stats = BatchStats::default();
    if let Some(ref pool) = dbs.mysql {
        stats.orders = place_orders(pool, rng).await;
    }
    if let Some(ref pool) = dbs.postgres {
        (stats.events, stats.metrics) = track_activity(pool, rng).await;
    }
    stats
}

pub async fn run_generate(args: GenerateArgs, config: DashConfig) -> Result<()> {
    let dbs = connect(&config, Target::All).await?;
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    let mut batches = 0u64;
    let mut totals = BatchStats::default();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!(interval = args.interval, count = ?args.count, "generating data");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = generate_batch(&dbs, &mut rng).await;
                batches += 1;
                totals.orders += stats.orders;
                totals.events += stats.events;
                totals.metrics += stats.metrics;
                tracing::info!(batch = batches, orders = stats.orders, events = stats.events, metrics = stats.metrics, "batch written");
                if args.count.is_some_and(|n| batches >= n) {
                    break;
                }
            }
            _ = &mut shutdown => {
                tracing::info!("generator stopped");
                break;
            }
        }
    }

    println!(
        "✓ {} batch(es): {} orders, {} events, {} metrics",
        batches, totals.orders, totals.events, totals.metrics
    );
    Ok(())
}
