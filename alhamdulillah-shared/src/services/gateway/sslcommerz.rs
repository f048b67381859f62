//! SSLCommerz hosted checkout
//!
//! # Endpoints
//!
//! - Session: `POST {base}/gwprocess/v4/api.php` (form encoded), answers
//!   `{ status, failedreason, sessionkey, GatewayPageURL }`
//! - Validation: `GET {base}/validator/api/validationserverAPI.php`,
//!   answers `{ status, tran_id, val_id, amount, ... }`
//! - Transaction query: `GET {base}/validator/api/merchantTransIDvalidationAPI.php`,
//!   answers `{ APIConnect, no_of_trans_found, element: [...] }` with one
//!   validation-shaped element per checkout attempt
//!
//! Amounts are sent and received as decimal BDT strings.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    format_bdt, parse_bdt_minor, CheckoutRequest, GatewayError, GatewaySession, GatewayValidation,
    PaymentGateway,
};

const SANDBOX_BASE_URL: &str = "https://sandbox.sslcommerz.com";
const LIVE_BASE_URL: &str = "https://securepay.sslcommerz.com";

#[derive(Debug, Clone)]
pub struct SslCommerzConfig {
    pub store_id: String,
    pub store_password: String,

    /// Use the sandbox instead of the live gateway
    pub sandbox: bool,

    /// Per-request timeout
    pub timeout_seconds: u64,
}

impl SslCommerzConfig {
    pub fn base_url(&self) -> &'static str {
        if self.sandbox {
            SANDBOX_BASE_URL
        } else {
            LIVE_BASE_URL
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: String,
    #[serde(default)]
    failedreason: Option<String>,
    #[serde(default)]
    sessionkey: Option<String>,
    #[serde(rename = "GatewayPageURL", default)]
    gateway_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    status: String,
    #[serde(default)]
    tran_id: Option<String>,
    #[serde(default)]
    val_id: Option<String>,
    #[serde(default)]
    amount: Option<String>,
}

impl ValidationResponse {
    fn into_record(self, fallback_val_id: &str) -> Result<GatewayValidation, GatewayError> {
        let transaction_id = self
            .tran_id
            .ok_or_else(|| GatewayError::Rejected(self.status.clone()))?;
        let amount_minor = match self.amount.as_deref().and_then(parse_bdt_minor) {
            Some(amount) => amount,
            // unpaid attempts may carry no amount
            None if !matches!(self.status.as_str(), "VALID" | "VALIDATED") => 0,
            None => {
                return Err(GatewayError::InvalidResponse(
                    "missing or malformed amount".into(),
                ))
            }
        };

        Ok(GatewayValidation {
            transaction_id,
            amount_minor,
            status: self.status,
            validation_id: self.val_id.unwrap_or_else(|| fallback_val_id.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TransactionQueryResponse {
    #[serde(rename = "APIConnect")]
    api_connect: String,
    #[serde(default)]
    element: Vec<ValidationResponse>,
}

pub struct SslCommerzGateway {
    client: reqwest::Client,
    config: SslCommerzConfig,
    base_url: String,
}

impl SslCommerzGateway {
    /// Builds the gateway client
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Transport` if the HTTP client cannot be built
    pub fn new(config: SslCommerzConfig) -> Result<Self, GatewayError> {
        let base_url = config.base_url().to_string();
        Self::with_base_url(config, base_url)
    }

    /// Builds a client against a custom base URL
    pub fn with_base_url(
        config: SslCommerzConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn session_form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        let customer = &request.customer;
        let address = customer.address.clone().unwrap_or_else(|| "N/A".to_string());

        vec![
            ("store_id", self.config.store_id.clone()),
            ("store_passwd", self.config.store_password.clone()),
            ("total_amount", format_bdt(request.amount)),
            ("currency", "BDT".to_string()),
            ("tran_id", request.transaction_id.clone()),
            ("success_url", request.success_url.clone()),
            ("fail_url", request.fail_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("ipn_url", request.ipn_url.clone()),
            ("shipping_method", "NO".to_string()),
            ("product_name", request.product_name.clone()),
            ("product_category", request.product_category.clone()),
            ("product_profile", "non-physical-goods".to_string()),
            ("cus_name", customer.name.clone()),
            ("cus_email", customer.email.clone()),
            ("cus_add1", address),
            ("cus_city", "Dhaka".to_string()),
            ("cus_country", "Bangladesh".to_string()),
            (
                "cus_phone",
                customer.phone.clone().unwrap_or_else(|| "N/A".to_string()),
            ),
        ]
    }
}

#[async_trait]
impl PaymentGateway for SslCommerzGateway {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<GatewaySession, GatewayError> {
        let url = format!("{}/gwprocess/v4/api.php", self.base_url);
        debug!(transaction_id = %request.transaction_id, "Opening SSLCommerz session");

        let response: SessionResponse = self
            .client
            .post(&url)
            .form(&self.session_form(request))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.gateway_page_url.filter(|u| !u.is_empty()) {
            Some(gateway_url) if response.status == "SUCCESS" => Ok(GatewaySession {
                gateway_url,
                session_key: response.sessionkey,
            }),
            _ => {
                let reason = response
                    .failedreason
                    .filter(|r| !r.is_empty())
                    .unwrap_or(response.status);
                warn!(transaction_id = %request.transaction_id, reason = %reason, "SSLCommerz refused session");
                Err(GatewayError::Rejected(reason))
            }
        }
    }

    async fn validate(&self, validation_id: &str) -> Result<GatewayValidation, GatewayError> {
        let url = format!("{}/validator/api/validationserverAPI.php", self.base_url);

        let response: ValidationResponse = self
            .client
            .get(&url)
            .query(&[
                ("val_id", validation_id),
                ("store_id", self.config.store_id.as_str()),
                ("store_passwd", self.config.store_password.as_str()),
                ("format", "json"),
                ("v", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_record(validation_id)
    }

    async fn find_transactions(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<GatewayValidation>, GatewayError> {
        let url = format!(
            "{}/validator/api/merchantTransIDvalidationAPI.php",
            self.base_url
        );

        let response: TransactionQueryResponse = self
            .client
            .get(&url)
            .query(&[
                ("tran_id", transaction_id),
                ("store_id", self.config.store_id.as_str()),
                ("store_passwd", self.config.store_password.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.api_connect != "DONE" {
            warn!(transaction_id, api_connect = %response.api_connect, "SSLCommerz refused transaction query");
            return Err(GatewayError::Rejected(response.api_connect));
        }

        response
            .element
            .into_iter()
            .map(|element| element.into_record(transaction_id))
            .collect()
    }

    fn name(&self) -> &str {
        "sslcommerz"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::{resolve, Customer, GatewayVerdict};
    use axum::{
        extract::Query,
        routing::{get, post},
        Form, Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;

    const SESSION_PATH: &str = "/gwprocess/v4/api.php";
    const VALIDATION_PATH: &str = "/validator/api/validationserverAPI.php";
    const QUERY_PATH: &str = "/validator/api/merchantTransIDvalidationAPI.php";

    fn config(sandbox: bool) -> SslCommerzConfig {
        SslCommerzConfig {
            store_id: "store".to_string(),
            store_password: "secret".to_string(),
            sandbox,
            timeout_seconds: 5,
        }
    }

    fn checkout() -> CheckoutRequest {
        CheckoutRequest {
            transaction_id: "AF20261019-ABC".to_string(),
            amount: 1000,
            product_name: "Membership Fee".to_string(),
            product_category: "Membership".to_string(),
            customer: Customer {
                name: "Rahim".to_string(),
                email: "rahim@example.com".to_string(),
                phone: None,
                address: None,
            },
            success_url: "http://api/success".to_string(),
            fail_url: "http://api/fail".to_string(),
            cancel_url: "http://api/cancel".to_string(),
            ipn_url: "http://api/ipn".to_string(),
        }
    }

    /// Serves `router` on a free local port, returns its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// A gateway whose every endpoint answers `body`
    async fn answering(body: Value) -> SslCommerzGateway {
        let handler = move || {
            let body = body.clone();
            async move { Json(body) }
        };
        let router = Router::new()
            .route(SESSION_PATH, post(handler.clone()))
            .route(VALIDATION_PATH, get(handler.clone()))
            .route(QUERY_PATH, get(handler));

        SslCommerzGateway::with_base_url(config(true), serve(router).await).unwrap()
    }

    #[test]
    fn test_base_url_follows_sandbox_flag() {
        assert_eq!(config(true).base_url(), SANDBOX_BASE_URL);
        assert_eq!(config(false).base_url(), LIVE_BASE_URL);
    }

    #[test]
    fn test_session_form_fields() {
        let gateway = SslCommerzGateway::new(config(true)).unwrap();
        let form = gateway.session_form(&checkout());
        let field = |name: &str| {
            form.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.clone())
        };

        assert_eq!(field("total_amount").as_deref(), Some("1000.00"));
        assert_eq!(field("currency").as_deref(), Some("BDT"));
        assert_eq!(field("tran_id").as_deref(), Some("AF20261019-ABC"));
        assert_eq!(field("cus_phone").as_deref(), Some("N/A"));
        assert_eq!(field("store_passwd").as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_create_session_posts_form_and_reads_gateway_url() {
        let router = Router::new().route(
            SESSION_PATH,
            post(|Form(form): Form<HashMap<String, String>>| async move {
                Json(json!({
                    "status": "SUCCESS",
                    "failedreason": "",
                    "sessionkey": form.get("tran_id"),
                    "GatewayPageURL": format!(
                        "https://pay.test/{}?amount={}",
                        form.get("store_id").cloned().unwrap_or_default(),
                        form.get("total_amount").cloned().unwrap_or_default()
                    ),
                }))
            }),
        );
        let gateway = SslCommerzGateway::with_base_url(config(true), serve(router).await).unwrap();

        let session = gateway.create_session(&checkout()).await.unwrap();

        assert_eq!(session.gateway_url, "https://pay.test/store?amount=1000.00");
        assert_eq!(session.session_key.as_deref(), Some("AF20261019-ABC"));
    }

    #[tokio::test]
    async fn test_create_session_refusals() {
        let gateway = answering(json!({
            "status": "FAILED",
            "failedreason": "Store Credential Error",
        }))
        .await;
        let err = gateway.create_session(&checkout()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(reason) if reason == "Store Credential Error"));

        // SUCCESS without a page to send the customer to is still a refusal
        let gateway = answering(json!({ "status": "SUCCESS", "GatewayPageURL": "" })).await;
        let err = gateway.create_session(&checkout()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(reason) if reason == "SUCCESS"));
    }

    #[tokio::test]
    async fn test_validate_sends_credentials_and_parses_record() {
        let router = Router::new().route(
            VALIDATION_PATH,
            get(|Query(query): Query<HashMap<String, String>>| async move {
                let authorised = query.get("store_id").map(String::as_str) == Some("store")
                    && query.get("store_passwd").map(String::as_str) == Some("secret");
                let status = if authorised { "VALID" } else { "INVALID_TRANSACTION" };
                Json(json!({
                    "status": status,
                    "tran_id": "AF1",
                    "val_id": query.get("val_id"),
                    "amount": "1000.00",
                }))
            }),
        );
        let gateway = SslCommerzGateway::with_base_url(config(true), serve(router).await).unwrap();

        let validation = gateway.validate("VAL-9").await.unwrap();

        assert_eq!(validation.validation_id, "VAL-9");
        assert_eq!(validation.amount_minor, 100_000);
        assert!(validation.confirms("AF1", 1000));
    }

    #[tokio::test]
    async fn test_validate_rejects_malformed_amount() {
        let gateway = answering(json!({
            "status": "VALID",
            "tran_id": "AF1",
            "val_id": "V1",
            "amount": "ten taka",
        }))
        .await;

        let err = gateway.validate("V1").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_validate_without_tran_id_is_a_refusal() {
        let gateway = answering(json!({ "status": "INVALID_TRANSACTION" })).await;

        let err = gateway.validate("FORGED").await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(status) if status == "INVALID_TRANSACTION"));
    }

    #[tokio::test]
    async fn test_find_transactions_reads_every_attempt() {
        let gateway = answering(json!({
            "APIConnect": "DONE",
            "no_of_trans_found": 2,
            "element": [
                { "status": "FAILED", "tran_id": "AF1" },
                { "status": "VALID", "tran_id": "AF1", "val_id": "V2", "amount": "1000.00" },
            ],
        }))
        .await;

        let records = gateway.find_transactions("AF1").await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount_minor, 0);
        assert_eq!(resolve("AF1", 1000, &records), GatewayVerdict::Paid("V2".to_string()));
    }

    #[tokio::test]
    async fn test_find_transactions_refused_connection() {
        let gateway = answering(json!({ "APIConnect": "INVALID_REQUEST" })).await;

        let err = gateway.find_transactions("AF1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(status) if status == "INVALID_REQUEST"));
    }

    #[tokio::test]
    async fn test_slow_gateway_is_a_transport_error() {
        let router = Router::new().route(
            VALIDATION_PATH,
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({ "status": "VALID" }))
            }),
        );
        let mut config = config(true);
        config.timeout_seconds = 1;
        let gateway = SslCommerzGateway::with_base_url(config, serve(router).await).unwrap();

        let err = gateway.validate("V1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[test]
    fn test_session_response_parsing() {
        let ok: SessionResponse = serde_json::from_str(
            r#"{"status":"SUCCESS","failedreason":"","sessionkey":"KEY","GatewayPageURL":"https://pay"}"#,
        )
        .unwrap();
        assert_eq!(ok.gateway_page_url.as_deref(), Some("https://pay"));

        let failed: SessionResponse =
            serde_json::from_str(r#"{"status":"FAILED","failedreason":"Store Credential Error"}"#)
                .unwrap();
        assert!(failed.gateway_page_url.is_none());
    }
}
