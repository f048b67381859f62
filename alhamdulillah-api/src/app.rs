//! Application state and router builder
//!
//! This module defines the shared application state and provides
//! a function to build the Axum router with all routes and middleware.
//!
//! # Example
//!
//! ```no_run
//! use alhamdulillah_api::{app::AppState, config::Config};
//! use alhamdulillah_shared::services::gateway::sslcommerz::SslCommerzGateway;
//! use alhamdulillah_shared::store::PgStore;
//! use sqlx::PgPool;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let pool = PgPool::connect(&config.database.url).await?;
//! let gateway = SslCommerzGateway::new(config.sslcommerz())?;
//! let state = AppState::new(Arc::new(PgStore::new(pool)), Arc::new(gateway), config);
//! let app = alhamdulillah_api::app::build_router(state);
//! # Ok(())
//! # }
//! ```

use crate::{config::Config, error::ApiError, middleware::security::SecurityHeadersLayer};
use alhamdulillah_shared::auth::middleware::authenticate;
use alhamdulillah_shared::services::gateway::PaymentGateway;
use alhamdulillah_shared::services::payments::PaymentSettings;
use alhamdulillah_shared::store::Store;
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// System of record
    pub store: Arc<dyn Store>,

    /// Payment gateway adapter
    pub gateway: Arc<dyn PaymentGateway>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, config: Config) -> Self {
        Self {
            store,
            gateway,
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    pub fn payment_settings(&self) -> PaymentSettings {
        self.config.payment_settings()
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                           # Health check (public)
/// └── /api/
///     ├── /auth/                        # register, login, refresh (public);
///     │                                 # me, stats, logout
///     ├── /users/                       # account administration
///     ├── /payments/                    # initiate, listings, approve, invoice
///     │   └── /callback/{success,fail,cancel,ipn}   # gateway returns (public)
///     ├── /funds/                       # ledger and expense requests
///     ├── /projects/                    # list/get public, writes authenticated
///     └── /notices/                     # list/get public, writes authenticated
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Authentication (protected routes only)
pub fn build_router(state: AppState) -> Router {
    use crate::routes::{auth, funds, health, notices, payments, projects, users};

    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/payments/callback/success", post(payments::callback_success))
        .route("/payments/callback/fail", post(payments::callback_fail))
        .route("/payments/callback/cancel", post(payments::callback_cancel))
        .route("/payments/callback/ipn", post(payments::callback_ipn))
        .route("/projects", get(projects::list_projects))
        .route("/projects/:id", get(projects::get_project))
        .route("/notices", get(notices::list_notices))
        .route("/notices/:id", get(notices::get_notice));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/stats", get(auth::stats))
        .route("/auth/logout", post(auth::logout))
        .route("/users", get(users::list_users))
        .route("/users/me", patch(users::update_me))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/payments", get(payments::list_payments))
        .route("/payments/initiate", post(payments::initiate))
        .route("/payments/my-payments", get(payments::my_payments))
        .route("/payments/:id/approve", patch(payments::approve))
        .route("/payments/invoice/:id", get(payments::invoice))
        .route("/funds/transaction", post(funds::add_transaction))
        .route("/funds/summary", get(funds::summary))
        .route("/funds/history", get(funds::history))
        .route("/funds/requests", get(funds::list_requests))
        .route("/funds/requests/:id/approve", patch(funds::approve_request))
        .route("/funds/requests/:id/reject", patch(funds::reject_request))
        .route("/projects", post(projects::create_project))
        .route(
            "/projects/:id",
            patch(projects::update_project).delete(projects::delete_project),
        )
        .route(
            "/projects/:id/members",
            get(projects::list_members).post(projects::add_member),
        )
        .route("/projects/:id/members/:user_id", delete(projects::remove_member))
        .route("/notices", post(notices::create_notice))
        .route(
            "/notices/:id",
            patch(notices::update_notice).delete(notices::delete_notice),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_layer,
        ));

    let api_routes = Router::new().merge(public_routes).merge(protected_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .expose_headers([HeaderName::from_static(crate::response::INVALIDATES_HEADER)])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Authentication middleware layer
///
/// Validates the bearer token, checks revocation and loads the caller from
/// the store, then injects the `AuthContext` into request extensions.
async fn auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let context = authenticate(state.store.as_ref(), state.jwt_secret(), header.as_deref()).await?;

    tracing::debug!(user_id = %context.user_id(), role = context.role().as_str(), "Request authenticated");
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}
