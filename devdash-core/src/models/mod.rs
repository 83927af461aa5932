//! Domain models with validation at construction
//!
//! Request types deserialize leniently and are turned into validated
//! `New*`/`*Patch` values before they reach a repository. Invalid input
//! returns `ValidationError`, never a panic.

/// `as_str`, `Display` and `FromStr` for a fieldless enum stored as text.
macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::models::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err($crate::models::ValidationError::InvalidVariant {
                        field: $field,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

pub mod analytics;
pub mod dashboard;
pub mod metric;
pub mod note;
pub mod order;
pub mod pagination;
pub mod product;
pub mod tags;
pub mod user;
pub mod validation;

pub use analytics::{AnalyticsEvent, AnalyticsSummary, CountBucket, EventFilter, EventQuery, NewEvent, TrackEventRequest};
pub use dashboard::{DashboardMetrics, EventStats, OrderStats, ProductStats, Sources, UserStats};
pub use metric::{
    MetricFilter, MetricQuery, MetricSource, MetricType, NewMetric, PerformanceMetric,
    RecordMetricRequest, RecordMetricsBody,
};
pub use note::{CreateNoteRequest, NewNote, Note, NoteFilter, NoteId, NotePatch, NoteQuery, UpdateNoteRequest};
pub use order::{
    CreateOrderRequest, NewOrder, Order, OrderFilter, OrderItem, OrderItemRequest, OrderQuery,
    OrderStatus, PaymentStatus, UpdateOrderStatusRequest,
};
pub use pagination::{PageInfo, Paginated, Pagination, PaginationParams};
pub use product::{CreateProductRequest, NewProduct, Product, ProductFilter, ProductPatch, ProductQuery, UpdateProductRequest};
pub use tags::Tags;
pub use user::{CreateUserRequest, Email, NewUser, UpdateUserRequest, User, UserFilter, UserPatch, UserQuery, UserStatus, Username};
pub use validation::ValidationError;
