//! Success envelope and cache-invalidation hints
//!
//! Every successful response has the shape
//!
//! ```json
//! { "success": true, "message": "...", "data": ..., "meta": { "page": 1, ... } }
//! ```
//!
//! `meta` is present on paginated listings only. Mutations add an
//! `X-Invalidates` header naming the entity tags whose cached reads a
//! client should refetch, e.g. `X-Invalidates: Payment, Fund, Auth`.

use alhamdulillah_shared::pagination::{Page, PageMeta};
use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const INVALIDATES_HEADER: &str = "x-invalidates";

/// Entity tags a client cache is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTag {
    Auth,
    User,
    Payment,
    Fund,
    Project,
    Notice,
}

impl CacheTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTag::Auth => "Auth",
            CacheTag::User => "User",
            CacheTag::Payment => "Payment",
            CacheTag::Fund => "Fund",
            CacheTag::Project => "Project",
            CacheTag::Notice => "Notice",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

/// A successful API response
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    envelope: Envelope<T>,
    invalidates: Vec<CacheTag>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: Envelope {
                success: true,
                message: message.into(),
                data,
                meta: None,
            },
            invalidates: Vec::new(),
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(message, data)
        }
    }

    /// Marks the response as a mutation affecting `tags`
    pub fn invalidates(mut self, tags: &[CacheTag]) -> Self {
        for tag in tags {
            if !self.invalidates.contains(tag) {
                self.invalidates.push(*tag);
            }
        }
        self
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    /// A paginated listing with `meta`
    pub fn page(message: impl Into<String>, page: Page<T>) -> Self {
        let mut response = Self::ok(message, page.items);
        response.envelope.meta = Some(page.meta);
        response
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.envelope)).into_response();

        if !self.invalidates.is_empty() {
            let tags = self
                .invalidates
                .iter()
                .map(CacheTag::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&tags) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(INVALIDATES_HEADER), value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alhamdulillah_shared::pagination::PageRequest;

    async fn render<T: Serialize>(response: ApiResponse<T>) -> (Response, serde_json::Value) {
        let response = response.into_response();
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        (
            Response::from_parts(parts, axum::body::Body::empty()),
            serde_json::from_slice(&bytes).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_ok_envelope_without_meta() {
        let (response, body) = render(ApiResponse::ok("Fetched", 42)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Fetched");
        assert_eq!(body["data"], 42);
        assert!(body.get("meta").is_none());
        assert!(response.headers().get(INVALIDATES_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_page_envelope_carries_meta() {
        let page = PageRequest::new(Some(1), Some(2), 10).slice(vec![1, 2, 3]);
        let (_, body) = render(ApiResponse::page("Listed", page)).await;
        assert_eq!(body["data"], serde_json::json!([1, 2]));
        assert_eq!(body["meta"]["totalPages"], 2);
        assert_eq!(body["meta"]["total"], 3);
    }

    #[tokio::test]
    async fn test_invalidation_header_dedupes() {
        let response = ApiResponse::created("Created", ())
            .invalidates(&[CacheTag::Payment, CacheTag::Fund])
            .invalidates(&[CacheTag::Fund, CacheTag::Auth]);
        let (response, _) = render(response).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(INVALIDATES_HEADER).unwrap(),
            "Payment, Fund, Auth"
        );
    }
}
