//! Orders and their line items (MySQL)
//!
//! Status is a plain string column updated directly; there is no transition
//! table.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::validation::optional_text;
use super::{Pagination, ValidationError};

const MAX_ITEMS: usize = 100;
const MAX_PAYMENT_METHOD_LEN: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub payment_method: Option<String>,
    pub payment_status: PaymentStatus,
    pub order_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

string_enum!(OrderStatus, "status", {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

string_enum!(PaymentStatus, "payment_status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

/// Order numbers look like `ORD-20240115-4821`.
pub fn order_number(date: NaiveDate, suffix: u16) -> String {
    format!("ORD-{}-{:04}", date.format("%Y%m%d"), suffix % 10_000)
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: i64,
    pub items: Vec<OrderItemRequest>,
    pub payment_method: Option<String>,
}

/// Validated order insert; prices are resolved from the catalogue at insert time
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub items: Vec<OrderItemRequest>,
    pub payment_method: Option<String>,
}

impl CreateOrderRequest {
    pub fn validate(self) -> Result<NewOrder, ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::Empty { field: "items" });
        }
        if self.items.len() > MAX_ITEMS {
            return Err(ValidationError::TooMany {
                field: "items",
                max: MAX_ITEMS,
            });
        }
        if self.items.iter().any(|i| i.quantity < 1) {
            return Err(ValidationError::OutOfRange {
                field: "quantity",
                reason: "must be at least 1",
            });
        }
        Ok(NewOrder {
            user_id: self.user_id,
            items: self.items,
            payment_method: optional_text(
                "payment_method",
                self.payment_method.as_deref(),
                MAX_PAYMENT_METHOD_LEN,
            )?,
        })
    }
}

impl NewOrder {
    /// Sum of `quantity * price`, with prices looked up by product id.
    pub fn total(&self, price_of: impl Fn(i64) -> Option<f64>) -> Result<f64, ValidationError> {
        let mut total = 0.0;
        for item in &self.items {
            let price = price_of(item.product_id).ok_or_else(|| ValidationError::UnknownReference {
                field: "product_id",
                id: item.product_id.to_string(),
            })?;
            total += price * item.quantity as f64;
        }
        Ok((total * 100.0).round() / 100.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub user_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl OrderQuery {
    pub fn into_parts(self) -> Result<(OrderFilter, Pagination), ValidationError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ValidationError::OutOfRange {
                    field: "from",
                    reason: "must not be after 'to'",
                });
            }
        }
        let status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .transpose()?;
        let filter = OrderFilter {
            status,
            user_id: self.user_id,
            from: self.from,
            to: self.to,
        };
        Ok((filter, Pagination::from_options(self.page, self.limit)))
    }
}
