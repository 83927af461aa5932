//! HTTP load generator
//!
//! Virtual users start spread across the ramp-up window, then loop until
//! the deadline: pick a weighted scenario, issue the request, think for
//! 0.1..2.0 s. A response with status 200..400 counts as a success.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::ui;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const THINK_MIN_SECS: f64 = 0.1;
const THINK_MAX_SECS: f64 = 2.0;
const MIN_SUCCESS_RATE: f64 = 95.0;

#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub path: &'static str,
    pub weight: u32,
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario { name: "health", path: "/health", weight: 20 },
    Scenario { name: "api_health", path: "/api/health", weight: 15 },
    Scenario { name: "users", path: "/api/users?limit=10", weight: 25 },
    Scenario { name: "products", path: "/api/products?limit=10", weight: 25 },
    Scenario { name: "orders", path: "/api/orders?limit=5", weight: 10 },
    Scenario { name: "dashboard", path: "/api/dashboard/metrics", weight: 5 },
];

#[derive(Parser, Debug)]
pub struct LoadtestArgs {
    /// Base URL of the server under test
    #[arg(long, value_parser = parse_base_url)]
    pub url: String,

    /// Concurrent virtual users
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub users: u32,

    /// Test duration in seconds
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub duration: u64,

    /// Seconds over which users are started
    #[arg(long, default_value_t = 10)]
    pub ramp_up: u64,

    /// Write the JSON report here as well as printing it
    #[arg(long)]
    pub output: Option<PathBuf>,
}

fn parse_base_url(raw: &str) -> Result<String, String> {
    let url = reqwest::Url::parse(raw).map_err(|e| format!("invalid URL: {}", e))?;
    match url.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        other => Err(format!("unsupported scheme '{}', use http or https", other)),
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub endpoint: &'static str,
    pub status: Option<u16>,
    pub elapsed_ms: f64,
    pub error: Option<String>,
}

impl Sample {
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=399))
    }

    fn error_key(&self) -> Option<String> {
        match (self.status, &self.error) {
            (_, Some(e)) => Some(e.clone()),
            (Some(s), None) if !self.is_success() => Some(format!("HTTP {}", s)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseStats {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Nearest-rank percentile over sorted values: index `floor(n * p / 100)`,
/// clamped to the last element.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * p / 100.0) as usize).min(sorted.len() - 1);
    sorted[index]
}

impl ResponseStats {
    pub fn from_times(times: &[f64]) -> Option<Self> {
        if times.is_empty() {
            return None;
        }
        let mut sorted = times.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        Some(Self {
            mean_ms: sorted.iter().sum::<f64>() / n as f64,
            median_ms: median,
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    pub requests: usize,
    pub successes: usize,
    pub success_rate: f64,
    pub avg_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub success_rate: Grade,
    pub response_time: Grade,
    pub throughput: Grade,
}

impl Assessment {
    pub fn grade(success_rate: f64, avg_ms: f64, rps: f64) -> Self {
        let success_rate = match success_rate {
            r if r >= 99.9 => Grade::Excellent,
            r if r >= 99.0 => Grade::Good,
            r if r >= 95.0 => Grade::Acceptable,
            _ => Grade::Poor,
        };
        let response_time = match avg_ms {
            t if t <= 100.0 => Grade::Excellent,
            t if t <= 500.0 => Grade::Good,
            t if t <= 1000.0 => Grade::Acceptable,
            _ => Grade::Poor,
        };
        let throughput = match rps {
            r if r >= 100.0 => Grade::Excellent,
            r if r >= 50.0 => Grade::Good,
            r if r >= 20.0 => Grade::Acceptable,
            _ => Grade::Poor,
        };
        Self {
            success_rate,
            response_time,
            throughput,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadTestReport {
    pub url: String,
    pub users: u32,
    pub duration_secs: f64,
    pub ramp_up_secs: u64,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub success_rate: f64,
    pub requests_per_second: f64,
    pub response_times: Option<ResponseStats>,
    pub endpoints: BTreeMap<String, EndpointStats>,
    pub errors: BTreeMap<String, usize>,
    pub assessment: Assessment,
}

impl LoadTestReport {
    pub fn build(url: String, users: u32, ramp_up_secs: u64, elapsed: Duration, samples: &[Sample]) -> Self {
        let total = samples.len();
        let successful = samples.iter().filter(|s| s.is_success()).count();
        let success_rate = if total == 0 { 0.0 } else { successful as f64 / total as f64 * 100.0 };
        let duration_secs = elapsed.as_secs_f64();
        let rps = if duration_secs > 0.0 { total as f64 / duration_secs } else { 0.0 };

        let times: Vec<f64> = samples.iter().filter(|s| s.is_success()).map(|s| s.elapsed_ms).collect();
        let response_times = ResponseStats::from_times(&times);

        let mut endpoints: BTreeMap<String, EndpointStats> = BTreeMap::new();
        for scenario in SCENARIOS {
            let hits: Vec<&Sample> = samples.iter().filter(|s| s.endpoint == scenario.name).collect();
            if hits.is_empty() {
                continue;
            }
            let successes = hits.iter().filter(|s| s.is_success()).count();
            endpoints.insert(
                scenario.name.to_string(),
                EndpointStats {
                    requests: hits.len(),
                    successes,
                    success_rate: successes as f64 / hits.len() as f64 * 100.0,
                    avg_ms: hits.iter().map(|s| s.elapsed_ms).sum::<f64>() / hits.len() as f64,
                },
            );
        }

        let mut errors = BTreeMap::new();
        for key in samples.iter().filter_map(Sample::error_key) {
            *errors.entry(key).or_insert(0) += 1;
        }

        let avg_ms = response_times.as_ref().map(|r| r.mean_ms).unwrap_or(f64::INFINITY);
        Self {
            url,
            users,
            duration_secs,
            ramp_up_secs,
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            success_rate,
            requests_per_second: rps,
            response_times,
            endpoints,
            errors,
            assessment: Assessment::grade(success_rate, avg_ms, rps),
        }
    }
}

fn think_time(rng: &mut StdRng) -> Duration {
    Duration::from_secs_f64(rng.gen_range(THINK_MIN_SECS..THINK_MAX_SECS))
}

/// Issue one request; the timing covers the full body transfer.
async fn hit(client: &reqwest::Client, base_url: &str, scenario: &Scenario) -> Sample {
    let started = Instant::now();
    let result = match client.get(format!("{}{}", base_url, scenario.path)).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            response.bytes().await.map(|_| status)
        }
        Err(e) => Err(e),
    };
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(status) => Sample {
            endpoint: scenario.name,
            status: Some(status),
            elapsed_ms,
            error: None,
        },
        Err(e) => Sample {
            endpoint: scenario.name,
            status: None,
            elapsed_ms,
            error: Some(if e.is_timeout() {
                "timeout".to_string()
            } else if e.is_connect() {
                "connection error".to_string()
            } else if e.is_body() {
                "body read error".to_string()
            } else {
                "request error".to_string()
            }),
        },
    }
}

async fn virtual_user(
    client: reqwest::Client,
    base_url: String,
    start_delay: Duration,
    deadline: Instant,
    weights: WeightedIndex<u32>,
) -> Vec<Sample> {
    let mut rng = StdRng::from_entropy();
    let mut samples = Vec::new();
    tokio::time::sleep(start_delay).await;

    while Instant::now() < deadline {
        let scenario = &SCENARIOS[weights.sample(&mut rng)];
        samples.push(hit(&client, &base_url, scenario).await);

        let pause = think_time(&mut rng);
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(pause.min(remaining)).await;
    }
    samples
}

pub async fn run_loadtest(args: LoadtestArgs) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;
    let weights = WeightedIndex::new(SCENARIOS.iter().map(|s| s.weight))
        .map_err(|e| anyhow!("invalid scenario weights: {}", e))?;

    tracing::info!(url = %args.url, users = args.users, duration = args.duration, ramp_up = args.ramp_up, "starting load test");
    let pb = ui::spinner(format!("{} users for {}s against {}", args.users, args.duration, args.url));

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration);
    let stagger = Duration::from_secs_f64(args.ramp_up as f64 / args.users as f64);

    let mut set = JoinSet::new();
    for i in 0..args.users {
        set.spawn(virtual_user(
            client.clone(),
            args.url.clone(),
            stagger * i,
            deadline,
            weights.clone(),
        ));
    }

    let mut samples = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(user_samples) => samples.extend(user_samples),
            Err(e) => tracing::warn!(error = %e, "virtual user task failed"),
        }
        ui::set_message(&pb, format!("{} requests so far", samples.len()));
    }
    let report = LoadTestReport::build(args.url, args.users, args.ramp_up, started.elapsed(), &samples);
    ui::finish_success(pb, format!("{} requests completed", report.total_requests));

    let json = serde_json::to_string_pretty(&report)?;
    if let Some(ref path) = args.output {
        std::fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "load test report written");
    }
    println!("{}", json);

    if report.success_rate < MIN_SUCCESS_RATE {
        bail!(
            "success rate {:.2}% is below {:.0}%",
            report.success_rate,
            MIN_SUCCESS_RATE
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(endpoint: &'static str, status: Option<u16>, ms: f64) -> Sample {
        Sample {
            endpoint,
            status,
            elapsed_ms: ms,
            error: if status.is_none() { Some("timeout".into()) } else { None },
        }
    }

    #[test]
    fn percentile_uses_floor_index_clamped() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 50.0), 6.0);
        assert_eq!(percentile(&sorted, 95.0), 10.0);
        assert_eq!(percentile(&sorted, 100.0), 10.0);
        assert_eq!(percentile(&[], 99.0), 0.0);
    }

    #[test]
    fn stats_over_unsorted_times() {
        let stats = ResponseStats::from_times(&[40.0, 10.0, 30.0, 20.0]).unwrap();
        assert_eq!(stats.min_ms, 10.0);
        assert_eq!(stats.max_ms, 40.0);
        assert_eq!(stats.mean_ms, 25.0);
        assert_eq!(stats.median_ms, 25.0);
        assert!(ResponseStats::from_times(&[]).is_none());
    }

    #[test]
    fn redirects_count_as_success() {
        assert!(sample("health", Some(302), 1.0).is_success());
        assert!(!sample("health", Some(400), 1.0).is_success());
        assert!(!sample("health", None, 1.0).is_success());
    }

    #[test]
    fn report_aggregates_endpoints_and_errors() {
        let samples = vec![
            sample("health", Some(200), 10.0),
            sample("health", Some(200), 30.0),
            sample("users", Some(503), 5.0),
            sample("users", None, 10_000.0),
        ];
        let report = LoadTestReport::build("http://x".into(), 2, 0, Duration::from_secs(2), &samples);
        assert_eq!(report.total_requests, 4);
        assert_eq!(report.successful_requests, 2);
        assert_eq!(report.success_rate, 50.0);
        assert_eq!(report.requests_per_second, 2.0);
        assert_eq!(report.endpoints["health"].avg_ms, 20.0);
        assert_eq!(report.endpoints["users"].successes, 0);
        assert_eq!(report.errors["HTTP 503"], 1);
        assert_eq!(report.errors["timeout"], 1);
        assert_eq!(report.assessment.success_rate, Grade::Poor);
    }

    #[test]
    fn grades_follow_thresholds() {
        let a = Assessment::grade(99.95, 80.0, 150.0);
        assert_eq!((a.success_rate, a.response_time, a.throughput), (Grade::Excellent, Grade::Excellent, Grade::Excellent));
        let a = Assessment::grade(96.0, 700.0, 25.0);
        assert_eq!((a.success_rate, a.response_time, a.throughput), (Grade::Acceptable, Grade::Acceptable, Grade::Acceptable));
    }

    #[test]
    fn url_must_be_http() {
        assert_eq!(parse_base_url("http://localhost:3000/").unwrap(), "http://localhost:3000");
        assert!(parse_base_url("ftp://example.com").is_err());
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn weights_are_valid() {
        assert!(WeightedIndex::new(SCENARIOS.iter().map(|s| s.weight)).is_ok());
        assert_eq!(SCENARIOS.iter().map(|s| s.weight).sum::<u32>(), 100);
    }

    #[tokio::test]
    async fn timing_includes_body_transfer() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            socket.write_all(b"done").await.unwrap();
        });

        let scenario = Scenario {
            name: "slow_body",
            path: "/",
            weight: 1,
        };
        let client = reqwest::Client::new();
        let sample = hit(&client, &format!("http://{}", addr), &scenario).await;
        assert_eq!(sample.status, Some(200));
        assert!(sample.elapsed_ms >= 250.0, "elapsed {} ms", sample.elapsed_ms);
    }
}
