//! Order repository (MySQL)
//!
//! - create: one transaction for the order row and its items, total computed
//!   from current product prices
//! - get: order plus items joined with product names
//! - status updates are direct writes, there is no state machine

use std::collections::HashMap;

use chrono::Utc;
use devdash_core::models::order::order_number;
use devdash_core::models::{
    NewOrder, Order, OrderFilter, OrderItem, OrderStatus, Paginated, Pagination, PaymentStatus,
    ValidationError,
};
use rand::Rng;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};

use super::DbError;
use crate::db::parse_column;

const ORDER_COLUMNS: &str = "id, user_id, order_number, status, CAST(total_amount AS DOUBLE) AS total_amount, \
                             payment_method, payment_status, order_date, created_at, updated_at";

const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Order repository
pub struct OrderRepo<'a> {
    pool: &'a MySqlPool,
}

impl<'a> OrderRepo<'a> {
    pub fn new(pool: &'a MySqlPool) -> Self {
        Self { pool }
    }

    /// List orders (without items), newest first.
    pub async fn list(&self, filter: &OrderFilter, page: Pagination) -> Result<Paginated<Order>, DbError> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM orders WHERE 1=1");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<MySql>::new(format!("SELECT {} FROM orders WHERE 1=1", ORDER_COLUMNS));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY order_date DESC, id DESC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = select.build().fetch_all(self.pool).await?;
        let items = rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated::new(items, total, page))
    }

    /// Get an order with its line items.
    pub async fn get(&self, id: i64) -> Result<Order, DbError> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("order", id))?;
        let mut order = order_from_row(&row)?;

        let items = sqlx::query(
            r#"
            SELECT oi.id, oi.product_id, p.name AS product_name, oi.quantity,
                   CAST(oi.unit_price AS DOUBLE) AS unit_price
            FROM order_items oi
            LEFT JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = ?
            ORDER BY oi.id
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        order.items = items
            .iter()
            .map(|r| {
                Ok(OrderItem {
                    id: r.try_get("id")?,
                    product_id: r.try_get("product_id")?,
                    product_name: r.try_get("product_name")?,
                    quantity: r.try_get("quantity")?,
                    unit_price: r.try_get("unit_price")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(order)
    }

    /// Create an order and its items atomically.
    ///
    /// Unit prices are read from active products inside the transaction;
    /// unknown or inactive products and unknown users are validation errors.
    pub async fn create(&self, order: NewOrder) -> Result<Order, DbError> {
        let mut tx = self.pool.begin().await?;

        let user: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ? AND deleted_at IS NULL")
            .bind(order.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Err(ValidationError::UnknownReference {
                field: "user_id",
                id: order.user_id.to_string(),
            }
            .into());
        }

        let mut lookup = QueryBuilder::<MySql>::new(
            "SELECT id, CAST(price AS DOUBLE) AS price FROM products WHERE is_active = 1 AND id IN (",
        );
        {
            let mut ids = lookup.separated(", ");
            for item in &order.items {
                ids.push_bind(item.product_id);
            }
        }
        lookup.push(")");

        let prices: HashMap<i64, f64> = lookup
            .build()
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|r| Ok((r.try_get("id")?, r.try_get("price")?)))
            .collect::<Result<_, sqlx::Error>>()?;

        let total = order.total(|id| prices.get(&id).copied())?;

        let mut order_id = None;
        for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
            let number = order_number(Utc::now().date_naive(), rand::thread_rng().gen_range(1000..=9999));
            let inserted = sqlx::query(
                r#"
                INSERT INTO orders (user_id, order_number, status, total_amount, payment_method, payment_status)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(order.user_id)
            .bind(&number)
            .bind(OrderStatus::Pending.as_str())
            .bind(total)
            .bind(&order.payment_method)
            .bind(PaymentStatus::Pending.as_str())
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(result) => {
                    order_id = Some(result.last_insert_id() as i64);
                    break;
                }
                Err(e) => match DbError::from_write(e, "order number", "user_id") {
                    DbError::Conflict(_) if attempt < ORDER_NUMBER_ATTEMPTS => {
                        tracing::debug!(order_number = %number, "order number collision, retrying");
                    }
                    other => return Err(other),
                },
            }
        }
        let order_id = order_id.ok_or_else(|| DbError::Conflict("could not allocate an order number".into()))?;

        for item in &order.items {
            let unit_price = prices.get(&item.product_id).copied().unwrap_or_default();
            sqlx::query("INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES (?, ?, ?, ?)")
                .bind(order_id)
                .bind(item.product_id)
                .bind(item.quantity)
                .bind(unit_price)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(order_id, total, items = order.items.len(), "order created");

        self.get(order_id).await
    }

    /// Set status (and optionally payment status).
    pub async fn update_status(
        &self,
        id: i64,
        status: OrderStatus,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Order, DbError> {
        sqlx::query(
            "UPDATE orders SET status = ?, payment_status = COALESCE(?, payment_status), \
             updated_at = CURRENT_TIMESTAMP(3) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(payment_status.map(|p| p.as_str()))
        .bind(id)
        .execute(self.pool)
        .await?;

        self.get(id).await
    }
}

fn push_filters(query: &mut QueryBuilder<'_, MySql>, filter: &OrderFilter) {
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(user_id) = filter.user_id {
        query.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(from) = filter.from {
        query.push(" AND order_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND order_date < ").push_bind(to);
    }
}

fn order_from_row(r: &MySqlRow) -> Result<Order, sqlx::Error> {
    let status: String = r.try_get("status")?;
    let payment_status: String = r.try_get("payment_status")?;
    Ok(Order {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        order_number: r.try_get("order_number")?,
        status: parse_column(&status, "status")?,
        total_amount: r.try_get("total_amount")?,
        payment_method: r.try_get("payment_method")?,
        payment_status: parse_column(&payment_status, "payment_status")?,
        order_date: r.try_get("order_date")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        items: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_is_half_open() {
        let now = Utc::now();
        let mut query = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM orders WHERE 1=1");
        push_filters(
            &mut query,
            &OrderFilter {
                status: Some(OrderStatus::Shipped),
                user_id: Some(3),
                from: Some(now - chrono::Duration::days(1)),
                to: Some(now),
            },
        );
        let sql = query.sql();
        assert!(sql.contains("order_date >= ?"));
        assert!(sql.contains("order_date < ?"));
        assert!(sql.contains("user_id = ?"));
    }
}
