//! Performance metric repository (PostgreSQL)

use devdash_core::models::{MetricFilter, MetricSource, NewMetric, PerformanceMetric};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::DbError;
use crate::db::parse_column;

const METRIC_COLUMNS: &str = "id, metric_name, metric_type, value, unit, source, tags, recorded_at";

/// Metric repository
pub struct MetricRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> MetricRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a batch in one transaction; all or nothing.
    pub async fn record(&self, metrics: Vec<NewMetric>) -> Result<Vec<PerformanceMetric>, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(metrics.len());

        for metric in &metrics {
            let row = sqlx::query(&format!(
                r#"
                INSERT INTO performance_metrics (metric_name, metric_type, value, unit, source, tags)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {}
                "#,
                METRIC_COLUMNS
            ))
            .bind(&metric.metric_name)
            .bind(metric.metric_type.as_str())
            .bind(metric.value)
            .bind(&metric.unit)
            .bind(metric.source.as_str())
            .bind(&metric.tags)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(metric_from_row(&row)?);
        }

        tx.commit().await?;
        tracing::debug!(count = stored.len(), "metrics recorded");
        Ok(stored)
    }

    pub async fn list(&self, filter: &MetricFilter) -> Result<Vec<PerformanceMetric>, DbError> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM performance_metrics WHERE recorded_at >= NOW() - make_interval(hours => ",
            METRIC_COLUMNS
        ));
        query.push_bind(filter.since_hours as i32).push(")");
        if let Some(ref name) = filter.name {
            query.push(" AND metric_name = ").push_bind(name.clone());
        }
        if let Some(source) = filter.source {
            query.push(" AND source = ").push_bind(source.as_str());
        }
        query
            .push(" ORDER BY recorded_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit as i64);

        let rows = query.build().fetch_all(self.pool).await?;
        Ok(rows.iter().map(metric_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    /// Latest sample per metric name, optionally restricted to one source.
    pub async fn latest(&self, source: Option<MetricSource>) -> Result<Vec<PerformanceMetric>, DbError> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT DISTINCT ON (metric_name) {} FROM performance_metrics WHERE 1=1",
            METRIC_COLUMNS
        ));
        if let Some(source) = source {
            query.push(" AND source = ").push_bind(source.as_str());
        }
        query.push(" ORDER BY metric_name, recorded_at DESC");

        let rows = query.build().fetch_all(self.pool).await?;
        Ok(rows.iter().map(metric_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

fn metric_from_row(r: &PgRow) -> Result<PerformanceMetric, sqlx::Error> {
    let metric_type: String = r.try_get("metric_type")?;
    let source: String = r.try_get("source")?;
    Ok(PerformanceMetric {
        id: r.try_get("id")?,
        metric_name: r.try_get("metric_name")?,
        metric_type: parse_column(&metric_type, "metric_type")?,
        value: r.try_get("value")?,
        unit: r.try_get("unit")?,
        source: parse_column(&source, "source")?,
        tags: r.try_get("tags")?,
        recorded_at: r.try_get("recorded_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::models::RecordMetricRequest;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn latest_returns_newest_sample_per_name() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = PgPool::connect(&url).await.unwrap();
        crate::db::migrations::run_pg(&pool).await.unwrap();
        let repo = MetricRepo::new(&pool);

        let name = format!("test.cpu.{}", rand::random::<u32>());
        for value in [10.0, 20.0] {
            let metric = RecordMetricRequest {
                metric_name: name.clone(),
                metric_type: None,
                value,
                unit: Some("percent".into()),
                source: Some(MetricSource::System),
                tags: None,
            }
            .validate()
            .unwrap();
            repo.record(vec![metric]).await.unwrap();
        }

        let latest = repo.latest(Some(MetricSource::System)).await.unwrap();
        let sample = latest.iter().find(|m| m.metric_name == name).unwrap();
        assert_eq!(sample.value, 20.0);
    }
}
