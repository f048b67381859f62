//! In-process gateway for tests and local demos
//!
//! Sessions always succeed unless the gateway is switched to failing mode.
//! Lookups answer only for records registered beforehand, the way a real
//! gateway only knows what the customer actually did at checkout.
//!
//! # Example
//!
//! ```
//! use alhamdulillah_shared::services::gateway::{MockGateway, PaymentGateway};
//!
//! # async fn example() {
//! let gateway = MockGateway::new();
//! gateway.complete("VAL-1", "AF20261019-0001", 1000);
//!
//! let validation = gateway.validate("VAL-1").await.unwrap();
//! assert!(validation.confirms("AF20261019-0001", 1000));
//! # }
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{CheckoutRequest, GatewayError, GatewaySession, GatewayValidation, PaymentGateway};

pub const MOCK_GATEWAY_URL: &str = "https://sandbox.gateway.test/pay";

#[derive(Default)]
pub struct MockGateway {
    failing: AtomicBool,
    records: Mutex<Vec<GatewayValidation>>,
    sessions: Mutex<Vec<CheckoutRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that refuses every session
    pub fn failing() -> Self {
        let gateway = Self::new();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Registers a gateway record
    pub fn register(&self, validation: GatewayValidation) {
        lock(&self.records).push(validation);
    }

    /// Registers a valid, completed payment of `amount` whole BDT
    pub fn complete(&self, validation_id: &str, transaction_id: &str, amount: i64) {
        self.register(GatewayValidation {
            transaction_id: transaction_id.to_string(),
            amount_minor: amount * 100,
            status: "VALID".to_string(),
            validation_id: validation_id.to_string(),
        });
    }

    /// Records an unpaid attempt, e.g. `FAILED` or `CANCELLED`
    pub fn decline(&self, transaction_id: &str, status: &str) {
        self.register(GatewayValidation {
            transaction_id: transaction_id.to_string(),
            amount_minor: 0,
            status: status.to_string(),
            validation_id: format!("{}-{}", status, transaction_id),
        });
    }

    /// Checkout requests received so far
    pub fn sessions(&self) -> Vec<CheckoutRequest> {
        lock(&self.sessions).clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<GatewaySession, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("gateway offline".to_string()));
        }

        lock(&self.sessions).push(request.clone());

        Ok(GatewaySession {
            gateway_url: format!("{}/{}", MOCK_GATEWAY_URL, request.transaction_id),
            session_key: Some(format!("MOCK-{}", request.transaction_id)),
        })
    }

    async fn validate(&self, validation_id: &str) -> Result<GatewayValidation, GatewayError> {
        lock(&self.records)
            .iter()
            .rev()
            .find(|r| r.validation_id == validation_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected("INVALID_TRANSACTION".to_string()))
    }

    async fn find_transactions(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<GatewayValidation>, GatewayError> {
        Ok(lock(&self.records)
            .iter()
            .filter(|r| r.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
