//! Security headers middleware
//!
//! This module provides middleware to add security-related HTTP headers
//! to all responses, following OWASP recommendations.
//!
//! # Headers Applied
//!
//! - `X-Content-Type-Options: nosniff` - Prevents MIME type sniffing
//! - `X-Frame-Options: DENY` - Prevents clickjacking
//! - `X-XSS-Protection: 1; mode=block` - Enables XSS protection in older browsers
//! - `Strict-Transport-Security` - Forces HTTPS (production only)
//! - `Content-Security-Policy` - The API serves JSON only, so nothing may load
//! - `Referrer-Policy: strict-origin-when-cross-origin` - Controls referrer information
//! - `Permissions-Policy` - Controls browser features
//!
//! # Example
//!
//! ```no_run
//! use axum::Router;
//! use alhamdulillah_api::middleware::security::SecurityHeadersLayer;
//!
//! let app: Router = Router::new()
//!     .layer(SecurityHeadersLayer::new(true)); // true = production mode
//! ```

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    response::Response,
};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Headers set on every response
const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "permissions-policy",
        "geolocation=(), microphone=(), camera=(), payment=(), usb=()",
    ),
    (
        "content-security-policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
];

const HSTS: &str = "max-age=31536000; includeSubDomains";

/// Security headers middleware layer
#[derive(Clone)]
pub struct SecurityHeadersLayer {
    /// Whether to enable HSTS (HTTPS-only, should be true in production)
    enable_hsts: bool,
}

impl SecurityHeadersLayer {
    /// Creates a new security headers layer
    ///
    /// # Arguments
    ///
    /// * `enable_hsts` - Whether to enable HSTS header (use true for production with HTTPS)
    pub fn new(enable_hsts: bool) -> Self {
        Self { enable_hsts }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersMiddleware {
            inner,
            enable_hsts: self.enable_hsts,
        }
    }
}

/// Security headers middleware service
#[derive(Clone)]
pub struct SecurityHeadersMiddleware<S> {
    inner: S,
    enable_hsts: bool,
}

impl<S> Service<Request> for SecurityHeadersMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let future = self.inner.call(request);
        let enable_hsts = self.enable_hsts;

        Box::pin(async move {
            let mut response = future.await?;

            let headers = response.headers_mut();
            for (name, value) in SECURITY_HEADERS {
                headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
            }

            // Only meaningful behind HTTPS
            if enable_hsts {
                headers.insert(
                    HeaderName::from_static("strict-transport-security"),
                    HeaderValue::from_static(HSTS),
                );
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::HeaderMap, routing::get, Router};
    use tower::Service as _;

    async fn headers(production: bool) -> HeaderMap {
        let mut app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(SecurityHeadersLayer::new(production));

        let response = app
            .call(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.headers().clone()
    }

    #[tokio::test]
    async fn test_security_headers_applied() {
        let headers = headers(false).await;

        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert_eq!(
            headers.get("Referrer-Policy").unwrap(),
            "strict-origin-when-cross-origin"
        );
        assert!(headers.get("Content-Security-Policy").is_some());
        assert!(headers.get("Permissions-Policy").is_some());
        assert!(headers.get("Strict-Transport-Security").is_none());
    }

    #[tokio::test]
    async fn test_hsts_enabled_in_production() {
        let headers = headers(true).await;
        assert_eq!(headers.get("Strict-Transport-Security").unwrap(), HSTS);
    }
}
