//! Notes endpoints
//!
//! Backed by whichever [`NoteStore`](crate::notes::NoteStore) was configured.
//! In dual mode the list response carries per-database `sources` counts.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use devdash_core::models::{CreateNoteRequest, Note, NoteQuery, UpdateNoteRequest};

use crate::http::error::ApiError;
use crate::http::extractors::{ValidJson, ValidNoteId, ValidQuery};
use crate::http::response::ApiResponse;
use crate::http::server::AppState;

/// GET /notes
async fn list_notes(
    State(state): State<Arc<AppState>>,
    ValidQuery(query): ValidQuery<NoteQuery>,
) -> Result<ApiResponse<Vec<Note>>, ApiError> {
    let (filter, page) = query.into_parts()?;
    let list = state.notes()?.list(&filter, page).await?;
    Ok(ApiResponse::paginated(list.page).with_sources(list.sources))
}

/// POST /notes
async fn create_note(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateNoteRequest>,
) -> Result<(StatusCode, ApiResponse<Note>), ApiError> {
    let store = state.notes()?;
    let note = store.create(req.validate()?).await?;
    tracing::debug!(note_id = %note.id, backend = store.backend(), "note created");
    Ok((StatusCode::CREATED, ApiResponse::ok(note)))
}

/// GET /notes/{id}
async fn get_note(
    State(state): State<Arc<AppState>>,
    ValidNoteId(id): ValidNoteId,
) -> Result<ApiResponse<Note>, ApiError> {
    Ok(ApiResponse::ok(state.notes()?.get(id.as_str()).await?))
}

/// PUT /notes/{id}
async fn update_note(
    State(state): State<Arc<AppState>>,
    ValidNoteId(id): ValidNoteId,
    ValidJson(req): ValidJson<UpdateNoteRequest>,
) -> Result<ApiResponse<Note>, ApiError> {
    let patch = req.validate()?;
    if patch.is_empty() {
        return Err(ApiError::BadRequest {
            message: "no fields to update".into(),
        });
    }
    Ok(ApiResponse::ok(state.notes()?.update(id.as_str(), &patch).await?))
}

/// DELETE /notes/{id}
async fn delete_note(
    State(state): State<Arc<AppState>>,
    ValidNoteId(id): ValidNoteId,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    if !state.notes()?.delete(id.as_str()).await? {
        return Err(ApiError::NotFound {
            resource: "note",
            id: id.as_str().to_owned(),
        });
    }
    Ok(ApiResponse::ok(serde_json::json!({ "id": id.as_str() })).with_message("note deleted"))
}

/// Note routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/{id}", get(get_note).put(update_note).delete(delete_note))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::{create_router, ServerConfig};
    use crate::notes::MemoryNoteStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(with_notes: bool) -> Router {
        let notes = with_notes.then(|| Arc::new(MemoryNoteStore::new()) as Arc<dyn crate::notes::NoteStore>);
        let state = Arc::new(AppState::new(None, None, notes));
        create_router(state, &ServerConfig::default())
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn create_then_fetch_note() {
        let app = app(true);
        let (status, created) = send(
            &app,
            "POST",
            "/api/notes",
            Some(json!({ "title": "Deploy checklist", "content": "run migrations", "tags": ["ops"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["success"], true);
        let id = created["data"]["id"].as_str().unwrap().to_owned();

        let (status, fetched) = send(&app, "GET", &format!("/api/notes/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"]["title"], "Deploy checklist");

        let (status, listed) = send(&app, "GET", "/api/notes?tag=ops", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);
        assert_eq!(listed["pagination"]["total_records"], 1);
    }

    #[tokio::test]
    async fn delete_missing_note_is_404() {
        let app = app(true);
        let (status, body) = send(&app, "DELETE", "/api/notes/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let app = app(true);
        let (_, created) = send(&app, "POST", "/api/notes", Some(json!({ "title": "t" }))).await;
        let id = created["data"]["id"].as_str().unwrap().to_owned();
        let (status, body) = send(&app, "PUT", &format!("/api/notes/{id}"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn malformed_json_is_enveloped() {
        let app = app(true);
        let request = Request::builder()
            .method("POST")
            .uri("/api/notes")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn notes_without_store_are_unavailable() {
        let app = app(false);
        let (status, body) = send(&app, "GET", "/api/notes", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "service_unavailable");
    }

    #[tokio::test]
    async fn mysql_routes_without_pool_are_unavailable() {
        let app = app(false);
        let (status, body) = send(&app, "GET", "/api/users", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, "GET", "/api/users/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dashboard_and_health_work_without_databases() {
        let app = app(false);
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, "GET", "/api/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }
}
