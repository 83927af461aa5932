//! Product endpoints (MySQL)

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use devdash_core::models::{CreateProductRequest, Product, ProductQuery, UpdateProductRequest};

use crate::db::repos::ProductRepo;
use crate::http::error::ApiError;
use crate::http::extractors::{RowId, ValidJson, ValidQuery};
use crate::http::response::ApiResponse;
use crate::http::server::AppState;

async fn list_products(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<ProductQuery>,
) -> Result<ApiResponse<Vec<Product>>, ApiError> {
    let (filter, page) = query.into_parts()?;
    let products = ProductRepo::new(state.mysql()?).list(&filter, page).await?;
    Ok(ApiResponse::paginated(products))
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateProductRequest>,
) -> Result<(StatusCode, ApiResponse<Product>), ApiError> {
    let product = ProductRepo::new(state.mysql()?).create(req.validate()?).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(product)))
}

async fn get_product(State(state): State<Arc<AppState>>, RowId(id): RowId) -> Result<ApiResponse<Product>, ApiError> {
    Ok(ApiResponse::ok(ProductRepo::new(state.mysql()?).get(id).await?))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    RowId(id): RowId,
    ValidJson(req): ValidJson<UpdateProductRequest>,
) -> Result<ApiResponse<Product>, ApiError> {
    let patch = req.validate()?;
    Ok(ApiResponse::ok(ProductRepo::new(state.mysql()?).update(id, &patch).await?))
}

async fn delete_product(
    State(state): State<Arc<AppState>>,
    RowId(id): RowId,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    ProductRepo::new(state.mysql()?).delete(id).await?;
    Ok(ApiResponse::ok(serde_json::json!({ "id": id })).with_message("product deleted"))
}

/// Product routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}
