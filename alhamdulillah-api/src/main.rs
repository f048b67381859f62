//! # Alhamdulillah Foundation API Server
//!
//! Serves the foundation's REST API: accounts, gateway payments, the fund
//! ledger, expense approvals, projects and notices.
//!
//! ## Start-up
//!
//! 1. Load configuration from the environment (and `.env`)
//! 2. Connect to PostgreSQL and run migrations
//! 3. Create the bootstrap super admin if configured
//! 4. Serve until Ctrl+C or SIGTERM
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p alhamdulillah-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

use alhamdulillah_api::{
    app::{build_router, AppState},
    config::Config,
};
use alhamdulillah_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    services::{gateway::SslCommerzGateway, users::bootstrap_super_admin},
    store::PgStore,
};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "alhamdulillah_api=debug,alhamdulillah_shared=debug,tower_http=debug".into()
            }),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "Alhamdulillah Foundation API v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await
    .context("Failed to connect to the database")?;

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store = Arc::new(PgStore::new(pool.clone()));

    if let Some(admin) = &config.bootstrap_admin {
        match bootstrap_super_admin(store.as_ref(), &admin.name, &admin.email, &admin.password)
            .await
            .context("Failed to create the bootstrap super admin")?
        {
            Some(user) => tracing::info!(user_id = %user.id, "Bootstrap super admin created"),
            None => tracing::debug!(email = %admin.email, "Bootstrap super admin already exists"),
        }
    }

    let gateway = SslCommerzGateway::new(config.sslcommerz())
        .context("Failed to build the payment gateway client")?;
    tracing::info!(sandbox = config.gateway.sandbox, "Payment gateway configured");

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(store, Arc::new(gateway), config));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}
