//! Success envelope: `{"success": true, "data": ..., "pagination"?, "sources"?, "message"?}`

use axum::response::{IntoResponse, Response};
use axum::Json;
use devdash_core::models::{PageInfo, Paginated};
use serde::Serialize;

use crate::notes::SourceCounts;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<SourceCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            pagination: None,
            sources: None,
            message: None,
        }
    }

    pub fn with_sources(mut self, sources: Option<SourceCounts>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn paginated(page: Paginated<T>) -> Self {
        let info = page.page_info();
        Self {
            pagination: Some(info),
            ..Self::ok(page.items)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::models::Pagination;

    #[test]
    fn paginated_envelope_shape() {
        let page = Paginated::new(vec![1, 2], 5, Pagination::new(1, 2));
        let json = serde_json::to_value(ApiResponse::paginated(page)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["pagination"]["total_records"], 5);
        assert_eq!(json["pagination"]["total_pages"], 3);
        assert!(json.get("sources").is_none());
        assert!(json.get("message").is_none());
    }
}
