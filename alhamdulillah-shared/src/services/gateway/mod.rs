//! Payment gateway adapters
//!
//! A gateway opens a hosted checkout session for a payment and later
//! confirms what the customer actually paid. Gateway returns are posted by
//! the customer's browser, so the payment workflow never acts on their
//! fields alone: [`resolve`] decides the outcome from the gateway's own
//! records, fetched through [`PaymentGateway::validate`] or
//! [`PaymentGateway::find_transactions`].
//!
//! # Adapters
//!
//! - [`SslCommerzGateway`]: SSLCommerz v4 hosted checkout
//! - [`MockGateway`]: deterministic in-process gateway for tests

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod mock;
pub mod sslcommerz;

pub use mock::MockGateway;
pub use sslcommerz::{SslCommerzConfig, SslCommerzGateway};

/// Error type for gateway calls
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Gateway could not be reached or timed out
    #[error("transport error: {0}")]
    Transport(String),

    /// Gateway answered but refused the request
    #[error("rejected by gateway: {0}")]
    Rejected(String),

    /// Gateway answered with something we cannot read
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Customer details sent with a checkout session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Everything needed to open a hosted checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Our reference, echoed back by the gateway as `tran_id`
    pub transaction_id: String,

    /// Whole BDT
    pub amount: i64,

    pub product_name: String,

    pub product_category: String,

    pub customer: Customer,

    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
    pub ipn_url: String,
}

/// An opened checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    /// Where to send the customer's browser
    pub gateway_url: String,

    pub session_key: Option<String>,
}

/// The gateway's own record of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayValidation {
    pub transaction_id: String,

    /// Amount in paisa (1/100 BDT)
    pub amount_minor: i64,

    /// Raw gateway status, e.g. `VALID`
    pub status: String,

    pub validation_id: String,
}

impl GatewayValidation {
    /// `VALID` for first validation, `VALIDATED` for repeats
    pub fn is_valid(&self) -> bool {
        matches!(self.status.as_str(), "VALID" | "VALIDATED")
    }

    /// True when the gateway confirms exactly this transaction and amount
    pub fn confirms(&self, transaction_id: &str, amount: i64) -> bool {
        self.is_valid()
            && self.transaction_id == transaction_id
            && Some(self.amount_minor) == amount.checked_mul(100)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout session
    async fn create_session(&self, request: &CheckoutRequest) -> Result<GatewaySession, GatewayError>;

    /// Looks up a completed transaction by the gateway's `val_id`
    async fn validate(&self, validation_id: &str) -> Result<GatewayValidation, GatewayError>;

    /// Every record the gateway holds for our `tran_id`, oldest first
    ///
    /// An empty list means the customer has not finished at the gateway.
    async fn find_transactions(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<GatewayValidation>, GatewayError>;

    fn name(&self) -> &str;
}

/// What the gateway's records say about one of our transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayVerdict {
    /// Paid in full; carries the confirming `val_id`
    Paid(String),

    /// Paid, but not the amount we asked for
    AmountMismatch,

    Failed,

    Cancelled,

    /// No final record yet
    Open,
}

/// Reduces gateway records to a verdict for `transaction_id`
///
/// Records for other transactions are ignored. Any record confirming the
/// full amount wins; otherwise the newest record decides.
pub fn resolve(transaction_id: &str, amount: i64, records: &[GatewayValidation]) -> GatewayVerdict {
    let ours: Vec<&GatewayValidation> = records
        .iter()
        .filter(|r| r.transaction_id == transaction_id)
        .collect();

    if let Some(paid) = ours.iter().find(|r| r.confirms(transaction_id, amount)) {
        return GatewayVerdict::Paid(paid.validation_id.clone());
    }
    if ours.iter().any(|r| r.is_valid()) {
        return GatewayVerdict::AmountMismatch;
    }

    match ours.last().map(|r| r.status.to_ascii_uppercase()).as_deref() {
        Some("FAILED") | Some("EXPIRED") => GatewayVerdict::Failed,
        Some("CANCELLED") => GatewayVerdict::Cancelled,
        _ => GatewayVerdict::Open,
    }
}

/// Parses a decimal BDT amount such as `"1000.00"` into paisa
///
/// Returns `None` for negative, malformed or sub-paisa amounts.
pub fn parse_bdt_minor(amount: &str) -> Option<i64> {
    let amount = amount.trim();
    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if fraction.len() > 2 && !fraction[2..].bytes().all(|b| b == b'0') {
        return None;
    }

    let whole: i64 = whole.parse().ok()?;
    let paisa = match fraction.get(..2).unwrap_or(fraction) {
        "" => 0,
        digits if digits.len() == 1 => digits.parse::<i64>().ok()? * 10,
        digits => digits.parse::<i64>().ok()?,
    };

    whole.checked_mul(100)?.checked_add(paisa)
}

/// Formats whole BDT the way gateways expect it
pub fn format_bdt(amount: i64) -> String {
    format!("{}.00", amount)
}
