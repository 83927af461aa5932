//! Dashboard aggregate spanning both databases
//!
//! Each section is `None` when its database is not configured or failed;
//! `sources` records which databases actually contributed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CountBucket, PerformanceMetric};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub generated_at: DateTime<Utc>,
    pub users: Option<UserStats>,
    pub orders: Option<OrderStats>,
    pub products: Option<ProductStats>,
    pub analytics: Option<EventStats>,
    pub system: Vec<PerformanceMetric>,
    pub sources: Sources,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sources {
    pub mysql: bool,
    pub postgresql: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub new_last_24h: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStats {
    pub total: i64,
    pub revenue: f64,
    pub last_24h: i64,
    pub by_status: Vec<CountBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductStats {
    pub total: i64,
    pub active: i64,
    pub low_stock: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStats {
    pub events_24h: i64,
    pub sessions_24h: i64,
}
