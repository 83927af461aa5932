//! Order endpoints (MySQL)

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Router;
use devdash_core::models::{CreateOrderRequest, Order, OrderQuery, UpdateOrderStatusRequest};

use crate::db::repos::OrderRepo;
use crate::http::error::ApiError;
use crate::http::extractors::{RowId, ValidJson, ValidQuery};
use crate::http::response::ApiResponse;
use crate::http::server::AppState;

async fn list_orders(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<OrderQuery>,
) -> Result<ApiResponse<Vec<Order>>, ApiError> {
    let (filter, page) = query.into_parts()?;
    let orders = OrderRepo::new(state.mysql()?).list(&filter, page).await?;
    Ok(ApiResponse::paginated(orders))
}

/// POST /orders - transactional insert, total computed from product prices
async fn create_order(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateOrderRequest>,
) -> Result<(StatusCode, ApiResponse<Order>), ApiError> {
    let order = OrderRepo::new(state.mysql()?).create(req.validate()?).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(order)))
}

async fn get_order(State(state): State<Arc<AppState>>, RowId(id): RowId) -> Result<ApiResponse<Order>, ApiError> {
    Ok(ApiResponse::ok(OrderRepo::new(state.mysql()?).get(id).await?))
}

/// PATCH /orders/{id}/status
async fn update_status(
    State(state): State<Arc<AppState>>,
    RowId(id): RowId,
    ValidJson(req): ValidJson<UpdateOrderStatusRequest>,
) -> Result<ApiResponse<Order>, ApiError> {
    let order = OrderRepo::new(state.mysql()?)
        .update_status(id, req.status, req.payment_status)
        .await?;
    tracing::info!(order_id = id, status = %order.status, "order status updated");
    Ok(ApiResponse::ok(order))
}

/// Order routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/status", patch(update_status))
}
