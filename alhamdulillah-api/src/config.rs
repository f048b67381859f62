//! Configuration management for the API server
//!
//! Configuration is read from environment variables once at start-up.
//!
//! # Environment Variables
//!
//! - `API_HOST` (default `0.0.0.0`), `API_PORT` (default `8080`)
//! - `CORS_ORIGINS`: comma separated origins, `*` for permissive (default `*`)
//! - `PRODUCTION`: enables HSTS (default `false`)
//! - `CLIENT_URL`: web client base, target of payment redirects
//!   (default `http://localhost:3000`)
//! - `PUBLIC_API_URL`: public base of this server, used to build gateway
//!   callback URLs (default `http://localhost:8080`)
//! - `DATABASE_URL` (required), `DATABASE_MAX_CONNECTIONS` (default `10`)
//! - `JWT_SECRET` (required, at least 32 characters)
//! - `SSLCOMMERZ_STORE_ID`, `SSLCOMMERZ_STORE_PASSWORD` (required),
//!   `SSLCOMMERZ_SANDBOX` (default `true`), `GATEWAY_TIMEOUT_SECONDS` (default `30`)
//! - `MEMBERSHIP_FEE`: whole BDT (default `1000`)
//! - `EXPENSE_MIN_VERIFICATIONS`: admin verifications required before final
//!   approval, `0` disables the check (default `1`)
//! - `SUPER_ADMIN_EMAIL`, `SUPER_ADMIN_PASSWORD`, `SUPER_ADMIN_NAME`:
//!   optional first super admin account
//!
//! # Example
//!
//! ```no_run
//! use alhamdulillah_api::config::Config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Server will listen on {}", config.bind_address());
//! # Ok(())
//! # }
//! ```

use alhamdulillah_shared::services::gateway::SslCommerzConfig;
use alhamdulillah_shared::services::payments::PaymentSettings;
use anyhow::Context;
use std::env;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub gateway: GatewayConfig,
    pub workflow: WorkflowConfig,

    /// First super admin, created at start-up if missing
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    /// Production mode turns on HSTS
    pub production: bool,

    /// Web client base URL
    pub client_url: String,

    /// Public base URL of this server
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for JWT signing, at least 32 bytes
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

/// SSLCommerz credentials
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub store_id: String,
    pub store_password: String,
    pub sandbox: bool,
    pub timeout_seconds: u64,
}

/// Business rules that vary per deployment
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Required membership fee, whole BDT
    pub membership_fee: i64,

    /// Admin verifications required before a super admin may approve an expense
    pub expense_min_verifications: u32,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{key} environment variable is required"))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a value does not
    /// parse, or `JWT_SECRET` is shorter than 32 characters.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let bootstrap_admin = match (optional("SUPER_ADMIN_EMAIL"), optional("SUPER_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin {
                name: optional("SUPER_ADMIN_NAME").unwrap_or_else(|| "Super Admin".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            api: ApiConfig {
                host: var_or("API_HOST", "0.0.0.0".to_string())?,
                port: var_or("API_PORT", 8080)?,
                cors_origins: parse_origins(&var_or("CORS_ORIGINS", "*".to_string())?),
                production: var_or("PRODUCTION", false)?,
                client_url: var_or("CLIENT_URL", "http://localhost:3000".to_string())?,
                public_url: var_or("PUBLIC_API_URL", "http://localhost:8080".to_string())?,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: var_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig { secret: jwt_secret },
            gateway: GatewayConfig {
                store_id: required("SSLCOMMERZ_STORE_ID")?,
                store_password: required("SSLCOMMERZ_STORE_PASSWORD")?,
                sandbox: var_or("SSLCOMMERZ_SANDBOX", true)?,
                timeout_seconds: var_or("GATEWAY_TIMEOUT_SECONDS", 30)?,
            },
            workflow: WorkflowConfig {
                membership_fee: var_or("MEMBERSHIP_FEE", 1000)?,
                expense_min_verifications: var_or("EXPENSE_MIN_VERIFICATIONS", 1)?,
            },
            bootstrap_admin,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn payment_settings(&self) -> PaymentSettings {
        PaymentSettings {
            membership_fee: self.workflow.membership_fee,
            callback_base_url: format!(
                "{}/api/payments/callback",
                self.api.public_url.trim_end_matches('/')
            ),
        }
    }

    pub fn sslcommerz(&self) -> SslCommerzConfig {
        SslCommerzConfig {
            store_id: self.gateway.store_id.clone(),
            store_password: self.gateway.store_password.clone(),
            sandbox: self.gateway.sandbox,
            timeout_seconds: self.gateway.timeout_seconds,
        }
    }

    /// Browser redirect target after a gateway return
    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.api.client_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["*".to_string()],
                production: false,
                client_url: "http://localhost:3000/".to_string(),
                public_url: "https://api.example.org/".to_string(),
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                max_connections: 10,
            },
            jwt: JwtConfig {
                secret: "test-secret-key-at-least-32-bytes-long".to_string(),
            },
            gateway: GatewayConfig {
                store_id: "store".to_string(),
                store_password: "secret".to_string(),
                sandbox: true,
                timeout_seconds: 30,
            },
            workflow: WorkflowConfig {
                membership_fee: 1000,
                expense_min_verifications: 1,
            },
            bootstrap_admin: None,
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(config().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_derived_urls_trim_trailing_slash() {
        let config = config();
        assert_eq!(
            config.payment_settings().callback_base_url,
            "https://api.example.org/api/payments/callback"
        );
        assert_eq!(config.dashboard_url(), "http://localhost:3000/dashboard");
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://a.org, https://b.org,,"),
            vec!["https://a.org", "https://b.org"]
        );
        assert_eq!(parse_origins("*"), vec!["*"]);
    }
}
