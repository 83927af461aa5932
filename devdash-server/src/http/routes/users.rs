//! User endpoints (MySQL, soft delete)
//!
//! Writes are mirrored to PostgreSQL when it is configured. A failed mirror
//! write is logged and never fails the request.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use devdash_core::models::{CreateUserRequest, UpdateUserRequest, User, UserQuery};

use crate::db::repos::{UserMirror, UserRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{RowId, ValidJson, ValidQuery};
use crate::http::response::ApiResponse;
use crate::http::server::AppState;

/// Keep the PostgreSQL copy of `user` in step; `None` removes it.
async fn mirror(state: &AppState, id: i64, user: Option<&User>) {
    let Some(pg) = state.postgres.as_ref() else {
        return;
    };
    let mirror = UserMirror::new(pg);
    let outcome = match user {
        Some(user) => mirror.upsert(user).await,
        None => mirror.remove(id).await,
    };
    if let Err(e) = outcome {
        tracing::warn!(user_id = id, error = %e, "user mirror write failed");
    }
}

/// GET /users
async fn list_users(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<UserQuery>,
) -> Result<ApiResponse<Vec<User>>, ApiError> {
    let (filter, page) = query.into_parts()?;
    let users = UserRepo::new(state.mysql()?).list(&filter, page).await?;
    Ok(ApiResponse::paginated(users))
}

/// POST /users
async fn create_user(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateUserRequest>,
) -> Result<(StatusCode, ApiResponse<User>), ApiError> {
    let user = req.validate()?;
    let user = UserRepo::new(state.mysql()?).create(user).await?;
    tracing::info!(user_id = user.id, username = %user.username, "user created");
    mirror(&state, user.id, Some(&user)).await;
    Ok((StatusCode::CREATED, ApiResponse::ok(user)))
}

/// GET /users/{id}
async fn get_user(State(state): State<Arc<AppState>>, RowId(id): RowId) -> Result<ApiResponse<User>, ApiError> {
    let user = UserRepo::new(state.mysql()?).get(id, false).await?;
    Ok(ApiResponse::ok(user))
}

/// PUT /users/{id}
async fn update_user(
    State(state): State<Arc<AppState>>,
    RowId(id): RowId,
    ValidJson(req): ValidJson<UpdateUserRequest>,
) -> Result<ApiResponse<User>, ApiError> {
    let patch = req.validate()?;
    let user = UserRepo::new(state.mysql()?).update(id, &patch).await?;
    mirror(&state, id, Some(&user)).await;
    Ok(ApiResponse::ok(user))
}

/// DELETE /users/{id}
async fn delete_user(
    State(state): State<Arc<AppState>>,
    RowId(id): RowId,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    UserRepo::new(state.mysql()?).soft_delete(id).await?;
    mirror(&state, id, None).await;
    Ok(ApiResponse::ok(serde_json::json!({ "id": id })).with_message("user deleted"))
}

/// POST /users/{id}/restore
async fn restore_user(State(state): State<Arc<AppState>>, RowId(id): RowId) -> Result<ApiResponse<User>, ApiError> {
    let user = UserRepo::new(state.mysql()?).restore(id).await?;
    mirror(&state, id, Some(&user)).await;
    Ok(ApiResponse::ok(user).with_message("user restored"))
}

/// User routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/users/{id}/restore", post(restore_user))
}
