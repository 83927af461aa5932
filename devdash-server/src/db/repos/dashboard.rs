//! Dashboard aggregate across both databases
//!
//! The MySQL and PostgreSQL sections are collected concurrently. A section
//! whose database is missing or failing is left empty and its `sources` flag
//! stays false; the dashboard itself never fails.

use chrono::Utc;
use devdash_core::models::{
    CountBucket, DashboardMetrics, EventStats, MetricSource, OrderStats, PerformanceMetric, ProductStats,
    Sources, UserStats,
};
use sqlx::{MySqlPool, PgPool, Row};

use super::{DbError, MetricRepo};

/// Stock level below which an active product counts as low
const LOW_STOCK_THRESHOLD: i32 = 10;

struct MySqlSection {
    users: UserStats,
    orders: OrderStats,
    products: ProductStats,
}

struct PgSection {
    analytics: EventStats,
    system: Vec<PerformanceMetric>,
}

/// Dashboard repository
pub struct DashboardRepo<'a> {
    mysql: Option<&'a MySqlPool>,
    pg: Option<&'a PgPool>,
}

impl<'a> DashboardRepo<'a> {
    pub fn new(mysql: Option<&'a MySqlPool>, pg: Option<&'a PgPool>) -> Self {
        Self { mysql, pg }
    }

    pub async fn collect(&self) -> DashboardMetrics {
        let (mysql, pg) = tokio::join!(self.mysql_section(), self.pg_section());

        let sources = Sources {
            mysql: mysql.is_some(),
            postgresql: pg.is_some(),
        };
        let (users, orders, products) = match mysql {
            Some(s) => (Some(s.users), Some(s.orders), Some(s.products)),
            None => (None, None, None),
        };
        let (analytics, system) = match pg {
            Some(s) => (Some(s.analytics), s.system),
            None => (None, Vec::new()),
        };

        DashboardMetrics {
            generated_at: Utc::now(),
            users,
            orders,
            products,
            analytics,
            system,
            sources,
        }
    }

    async fn mysql_section(&self) -> Option<MySqlSection> {
        let pool = self.mysql?;
        match mysql_stats(pool).await {
            Ok(section) => Some(section),
            Err(e) => {
                tracing::warn!(error = %e, "dashboard: MySQL section unavailable");
                None
            }
        }
    }

    async fn pg_section(&self) -> Option<PgSection> {
        let pool = self.pg?;
        match pg_stats(pool).await {
            Ok(section) => Some(section),
            Err(e) => {
                tracing::warn!(error = %e, "dashboard: PostgreSQL section unavailable");
                None
            }
        }
    }
}

async fn mysql_stats(pool: &MySqlPool) -> Result<MySqlSection, DbError> {
    // SUM() over booleans is DECIMAL in MySQL, hence the casts
    let users = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               CAST(COALESCE(SUM(is_active = 1), 0) AS SIGNED) AS active,
               CAST(COALESCE(SUM(created_at >= NOW() - INTERVAL 1 DAY), 0) AS SIGNED) AS new_last_24h
        FROM users
        WHERE deleted_at IS NULL
        "#,
    )
    .fetch_one(pool)
    .await?;

    let orders = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               CAST(COALESCE(SUM(CASE WHEN status <> 'cancelled' THEN total_amount ELSE 0 END), 0) AS DOUBLE) AS revenue,
               CAST(COALESCE(SUM(order_date >= NOW() - INTERVAL 1 DAY), 0) AS SIGNED) AS last_24h
        FROM orders
        "#,
    )
    .fetch_one(pool)
    .await?;

    let by_status = sqlx::query(
        "SELECT status AS bucket, COUNT(*) AS count FROM orders GROUP BY status ORDER BY count DESC, bucket",
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|r| {
        Ok(CountBucket {
            key: r.try_get("bucket")?,
            count: r.try_get("count")?,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let products = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               CAST(COALESCE(SUM(is_active = 1), 0) AS SIGNED) AS active,
               CAST(COALESCE(SUM(is_active = 1 AND stock_quantity < ?), 0) AS SIGNED) AS low_stock
        FROM products
        "#,
    )
    .bind(LOW_STOCK_THRESHOLD)
    .fetch_one(pool)
    .await?;

    Ok(MySqlSection {
        users: UserStats {
            total: users.try_get("total")?,
            active: users.try_get("active")?,
            new_last_24h: users.try_get("new_last_24h")?,
        },
        orders: OrderStats {
            total: orders.try_get("total")?,
            revenue: orders.try_get("revenue")?,
            last_24h: orders.try_get("last_24h")?,
            by_status,
        },
        products: ProductStats {
            total: products.try_get("total")?,
            active: products.try_get("active")?,
            low_stock: products.try_get("low_stock")?,
        },
    })
}

async fn pg_stats(pool: &PgPool) -> Result<PgSection, DbError> {
    let events = sqlx::query(
        r#"
        SELECT COUNT(*) AS events_24h, COUNT(DISTINCT session_id) AS sessions_24h
        FROM analytics_events
        WHERE created_at >= NOW() - INTERVAL '24 hours'
        "#,
    )
    .fetch_one(pool)
    .await?;

    let system = MetricRepo::new(pool).latest(Some(MetricSource::System)).await?;

    Ok(PgSection {
        analytics: EventStats {
            events_24h: events.try_get("events_24h")?,
            sessions_24h: events.try_get("sessions_24h")?,
        },
        system,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_databases_yields_empty_dashboard() {
        let dashboard = DashboardRepo::new(None, None).collect().await;
        assert_eq!(dashboard.sources, Sources::default());
        assert!(dashboard.users.is_none());
        assert!(dashboard.analytics.is_none());
        assert!(dashboard.system.is_empty());
    }

    #[tokio::test]
    async fn unreachable_database_is_reported_not_fatal() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/nothing")
            .unwrap();
        let dashboard = DashboardRepo::new(None, Some(&pool)).collect().await;
        assert!(!dashboard.sources.postgresql);
        assert!(dashboard.analytics.is_none());
    }
}
