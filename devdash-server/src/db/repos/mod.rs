//! Repository implementations
//!
//! Each repository borrows a pool and exposes typed operations. MySQL owns
//! users, products and orders; PostgreSQL owns analytics and metrics and
//! mirrors the live users.

pub mod analytics;
pub mod dashboard;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod users;

pub use analytics::AnalyticsRepo;
pub use dashboard::DashboardRepo;
pub use metrics::MetricRepo;
pub use orders::OrderRepo;
pub use products::ProductRepo;
pub use users::{UserMirror, UserRepo};

pub use super::DbError;
