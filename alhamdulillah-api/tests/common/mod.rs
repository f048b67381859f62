//! Common test utilities for integration tests
//!
//! Builds the real router over the in-memory store and the mock gateway,
//! so the whole HTTP surface runs without PostgreSQL or network access.
//!
//! - Account creation with tokens for any role
//! - JSON and form request helpers returning status, headers and body

#![allow(dead_code)]

use alhamdulillah_api::app::{build_router, AppState};
use alhamdulillah_api::config::{
    ApiConfig, Config, DatabaseConfig, GatewayConfig, JwtConfig, WorkflowConfig,
};
use alhamdulillah_shared::auth::jwt::issue_token_pair;
use alhamdulillah_shared::models::user::{CreateUser, User, UserRole, UserStatus};
use alhamdulillah_shared::services::gateway::MockGateway;
use alhamdulillah_shared::store::{MemoryStore, UserStore};
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tower::Service as _;
use uuid::Uuid;

pub const CLIENT_URL: &str = "http://localhost:3000";

/// Test context containing all necessary resources
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub app: axum::Router,
    pub config: Config,
}

/// A fully read response
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Panics with the body when the status differs
    pub fn expect(self, status: StatusCode) -> Self {
        assert_eq!(self.status, status, "unexpected status, body: {}", self.body);
        self
    }
}

pub fn test_config() -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            production: false,
            client_url: CLIENT_URL.to_string(),
            public_url: "http://localhost:8080".to_string(),
        },
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
        },
        jwt: JwtConfig {
            secret: "integration-test-secret-at-least-32-bytes".to_string(),
        },
        gateway: GatewayConfig {
            store_id: "teststore".to_string(),
            store_password: "teststore@ssl".to_string(),
            sandbox: true,
            timeout_seconds: 5,
        },
        workflow: WorkflowConfig {
            membership_fee: 1000,
            expense_min_verifications: 1,
        },
        bootstrap_admin: None,
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());

        let state = AppState::new(store.clone(), gateway.clone(), config.clone());
        let app = build_router(state);

        TestContext {
            store,
            gateway,
            app,
            config,
        }
    }

    /// Creates an ACTIVE account with `role` and returns it with an access token
    pub async fn account(&self, role: UserRole) -> anyhow::Result<(User, String)> {
        let user = self
            .store
            .create_user(CreateUser {
                name: format!("{} {}", role.as_str(), &Uuid::new_v4().to_string()[..8]),
                email: format!("{}@example.org", Uuid::new_v4()),
                phone: Some("01700000000".to_string()),
                address: None,
                password_hash: String::new(),
                role,
                status: UserStatus::Active,
            })
            .await?;

        let tokens = issue_token_pair(user.id, &self.config.jwt.secret)?;
        Ok((user, tokens.access_token))
    }

    pub async fn token(&self, role: UserRole) -> String {
        self.account(role).await.unwrap().1
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().call(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Sends a JSON request, optionally authenticated
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.json(Method::GET, uri, token, None).await
    }

    /// Posts a form the way the payment gateway does
    pub async fn form(&self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();

        self.send(request).await
    }
}
