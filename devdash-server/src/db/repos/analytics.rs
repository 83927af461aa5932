//! Analytics event repository (PostgreSQL)

use devdash_core::models::{AnalyticsEvent, AnalyticsSummary, CountBucket, EventFilter, NewEvent};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::DbError;

const EVENT_COLUMNS: &str = "id, session_id, user_id, event_type, event_name, page_url, device_type, \
                             browser, operating_system, country, city, event_data, created_at";

/// Buckets returned per breakdown in the summary
const TOP_BUCKETS: i64 = 10;

/// Analytics repository
pub struct AnalyticsRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> AnalyticsRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record one event.
    pub async fn track(&self, event: NewEvent) -> Result<AnalyticsEvent, DbError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO analytics_events (
                session_id, user_id, event_type, event_name, page_url, device_type,
                browser, operating_system, country, city, event_data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(&event.session_id)
        .bind(event.user_id)
        .bind(&event.event_type)
        .bind(&event.event_name)
        .bind(&event.page_url)
        .bind(&event.device_type)
        .bind(&event.browser)
        .bind(&event.operating_system)
        .bind(&event.country)
        .bind(&event.city)
        .bind(&event.event_data)
        .fetch_one(self.pool)
        .await?;

        Ok(event_from_row(&row)?)
    }

    /// Recent events inside the filter window, newest first.
    pub async fn list(&self, filter: &EventFilter) -> Result<Vec<AnalyticsEvent>, DbError> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM analytics_events WHERE created_at >= NOW() - make_interval(hours => ",
            EVENT_COLUMNS
        ));
        query.push_bind(filter.since_hours as i32).push(")");
        if let Some(ref event_type) = filter.event_type {
            query.push(" AND event_type = ").push_bind(event_type.clone());
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit as i64);

        let rows = query.build().fetch_all(self.pool).await?;
        Ok(rows.iter().map(event_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    /// Totals and breakdowns over the last `hours`.
    pub async fn summary(&self, hours: u32) -> Result<AnalyticsSummary, DbError> {
        let hours = hours as i32;
        let totals = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_events, COUNT(DISTINCT session_id) AS unique_sessions
            FROM analytics_events
            WHERE created_at >= NOW() - make_interval(hours => $1)
            "#,
        )
        .bind(hours)
        .fetch_one(self.pool)
        .await?;

        Ok(AnalyticsSummary {
            window_hours: hours as u32,
            total_events: totals.try_get("total_events")?,
            unique_sessions: totals.try_get("unique_sessions")?,
            by_event_type: self.breakdown("event_type", hours).await?,
            by_device_type: self.breakdown("device_type", hours).await?,
            by_country: self.breakdown("country", hours).await?,
        })
    }

    /// `column` is a fixed column name, never user input.
    async fn breakdown(&self, column: &'static str, hours: i32) -> Result<Vec<CountBucket>, DbError> {
        let sql = format!(
            r#"
            SELECT COALESCE({col}, 'unknown') AS key, COUNT(*) AS count
            FROM analytics_events
            WHERE created_at >= NOW() - make_interval(hours => $1)
            GROUP BY COALESCE({col}, 'unknown')
            ORDER BY count DESC, key
            LIMIT $2
            "#,
            col = column
        );
        let rows = sqlx::query(&sql)
            .bind(hours)
            .bind(TOP_BUCKETS)
            .fetch_all(self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| {
                Ok(CountBucket {
                    key: r.try_get("key")?,
                    count: r.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?)
    }
}

fn event_from_row(r: &PgRow) -> Result<AnalyticsEvent, sqlx::Error> {
    Ok(AnalyticsEvent {
        id: r.try_get("id")?,
        session_id: r.try_get("session_id")?,
        user_id: r.try_get("user_id")?,
        event_type: r.try_get("event_type")?,
        event_name: r.try_get("event_name")?,
        page_url: r.try_get("page_url")?,
        device_type: r.try_get("device_type")?,
        browser: r.try_get("browser")?,
        operating_system: r.try_get("operating_system")?,
        country: r.try_get("country")?,
        city: r.try_get("city")?,
        event_data: r.try_get("event_data")?,
        created_at: r.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::models::TrackEventRequest;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn track_then_summarize() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = PgPool::connect(&url).await.unwrap();
        crate::db::migrations::run_pg(&pool).await.unwrap();
        let repo = AnalyticsRepo::new(&pool);

        let event = TrackEventRequest {
            session_id: "sess-test".into(),
            event_type: "page_view".into(),
            device_type: Some("desktop".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let stored = repo.track(event).await.unwrap();
        assert_eq!(stored.event_data, serde_json::json!({}));

        let summary = repo.summary(1).await.unwrap();
        assert!(summary.total_events >= 1);
        assert!(summary.by_event_type.iter().any(|b| b.key == "page_view"));
    }
}
