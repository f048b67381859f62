//! Payment lifecycle
//!
//! `initiate` creates an INITIATED record, opens a gateway session and
//! moves the record to PENDING. The payment then settles exactly once:
//! through a validated gateway return, or through manual admin approval.
//! Settlement (PAID, ledger income, membership promotion) is a single
//! store operation guarded on the current status, so a replayed return
//! finds the payment already settled and changes nothing.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{ServiceError, ServiceResult};
use super::gateway::{
    resolve, CheckoutRequest, Customer, GatewayError, GatewayValidation, GatewayVerdict,
    PaymentGateway,
};
use super::ledger::check_amount;
use crate::auth::authorization::{is_member, require_admin, require_self_or_admin};
use crate::models::payment::{
    generate_transaction_id, CreatePayment, Payment, PaymentFilter, PaymentMethod,
    PaymentPurpose, PaymentStatus,
};
use crate::models::user::{User, UserSummary};
use crate::pagination::{Page, PageRequest};
use crate::store::Store;

/// Settings the payment workflow needs from configuration
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Required MEMBERSHIP_FEE amount, whole BDT
    pub membership_fee: i64,

    /// Public base of the gateway return routes, e.g.
    /// `https://api.example.org/api/payments/callback`
    pub callback_base_url: String,
}

impl PaymentSettings {
    pub fn callback_url(&self, outcome: GatewayOutcome) -> String {
        format!(
            "{}/{}",
            self.callback_base_url.trim_end_matches('/'),
            outcome.as_path()
        )
    }
}

/// Which gateway return route was hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    Success,
    Fail,
    Cancel,
    Ipn,
}

impl GatewayOutcome {
    pub fn as_path(&self) -> &'static str {
        match self {
            GatewayOutcome::Success => "success",
            GatewayOutcome::Fail => "fail",
            GatewayOutcome::Cancel => "cancel",
            GatewayOutcome::Ipn => "ipn",
        }
    }
}

/// Input for starting a payment
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePayment {
    pub amount: i64,
    pub method: PaymentMethod,
    pub purpose: PaymentPurpose,
    pub project_id: Option<Uuid>,
}

/// A payment waiting at the gateway
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedPayment {
    pub gateway_url: String,
    pub payment: Payment,
}

/// Form fields the gateway posts back
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayReturn {
    pub tran_id: Option<String>,
    pub val_id: Option<String>,
    pub amount: Option<String>,
    pub status: Option<String>,
}

/// Result of processing a gateway return
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    /// The payment as stored after processing
    pub payment: Payment,
    pub message: String,
}

/// A payment with its payer's identity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    pub user: Option<UserSummary>,
}

/// Invoice data for one payment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(flatten)]
    pub payment: Payment,
    pub purpose_label: &'static str,
    pub user: Option<UserSummary>,
    pub project_name: Option<String>,
}

/// Filters a caller may pass to payment listings
#[derive(Debug, Clone, Default)]
pub struct PaymentQuery {
    pub filter: PaymentFilter,
    pub page: PageRequest,
}

/// Starts a payment and returns where to send the customer
///
/// # Errors
///
/// - `Validation` for a non-positive amount, a missing project on a
///   project donation, or a membership fee of the wrong amount
/// - `NotFound` if the project does not exist
/// - `StateConflict` if the caller is already a member and pays a membership fee
/// - `GatewayUnavailable` if no session could be opened; the INITIATED
///   record stays in place
pub async fn initiate(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    settings: &PaymentSettings,
    actor: &User,
    input: InitiatePayment,
) -> ServiceResult<InitiatedPayment> {
    check_amount(input.amount)?;

    let project = match input.purpose {
        PaymentPurpose::ProjectDonation => {
            let project_id = input.project_id.ok_or_else(|| {
                ServiceError::Validation("projectId is required for project donations".to_string())
            })?;
            Some(
                store
                    .find_project(project_id)
                    .await?
                    .ok_or(ServiceError::NotFound("Project"))?,
            )
        }
        PaymentPurpose::MembershipFee => {
            if is_member(actor.role) {
                return Err(ServiceError::StateConflict(
                    "You are already a member".to_string(),
                ));
            }
            if input.amount != settings.membership_fee {
                return Err(ServiceError::Validation(format!(
                    "Membership fee is {} BDT",
                    settings.membership_fee
                )));
            }
            None
        }
        PaymentPurpose::MonthlyDonation => None,
    };

    let payment = store
        .create_payment(CreatePayment {
            user_id: actor.id,
            project_id: project.as_ref().map(|p| p.id),
            amount: input.amount,
            method: input.method,
            purpose: input.purpose,
            transaction_id: generate_transaction_id(),
        })
        .await?;

    info!(
        payment_id = %payment.id,
        transaction_id = %payment.transaction_id,
        purpose = payment.purpose.as_str(),
        amount = payment.amount,
        "Payment initiated"
    );

    let request = CheckoutRequest {
        transaction_id: payment.transaction_id.clone(),
        amount: payment.amount,
        product_name: match &project {
            Some(project) => format!("Donation: {}", project.name),
            None => payment.purpose.label().to_string(),
        },
        product_category: payment.purpose.label().to_string(),
        customer: Customer {
            name: actor.name.clone(),
            email: actor.email.clone(),
            phone: actor.phone.clone(),
            address: actor.address.clone(),
        },
        success_url: settings.callback_url(GatewayOutcome::Success),
        fail_url: settings.callback_url(GatewayOutcome::Fail),
        cancel_url: settings.callback_url(GatewayOutcome::Cancel),
        ipn_url: settings.callback_url(GatewayOutcome::Ipn),
    };

    let session = gateway.create_session(&request).await.map_err(|e| {
        warn!(payment_id = %payment.id, gateway = gateway.name(), error = %e, "Gateway session failed");
        ServiceError::GatewayUnavailable(e.to_string())
    })?;

    let payment = store
        .mark_payment_pending(payment.id, session.session_key)
        .await?
        .ok_or_else(|| {
            ServiceError::StateConflict("Payment changed while opening the gateway session".into())
        })?;

    Ok(InitiatedPayment {
        gateway_url: session.gateway_url,
        payment,
    })
}

/// Applies a gateway return to the payment it names
///
/// The posted form only names the transaction. Its status is never
/// trusted: the outcome comes from the gateway's records, first through
/// the posted `val_id` and otherwise through a lookup by `tran_id`. A
/// payment the gateway reports as paid in full settles; one it reports as
/// failed, cancelled or underpaid closes; anything else stays open for a
/// later return or IPN. Returns for a payment that already reached a final
/// status change nothing.
///
/// # Errors
///
/// - `Validation` without a `tran_id`
/// - `NotFound` for an unknown `tran_id`
/// - `GatewayUnavailable` if the gateway cannot be reached; the payment
///   stays open so the IPN can retry
pub async fn handle_gateway_return(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    outcome: GatewayOutcome,
    form: GatewayReturn,
) -> ServiceResult<ReturnOutcome> {
    let transaction_id = form
        .tran_id
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::Validation("Missing tran_id".to_string()))?;

    let payment = store
        .find_payment_by_transaction(transaction_id)
        .await?
        .ok_or(ServiceError::NotFound("Payment"))?;

    if payment.payment_status.is_terminal() {
        info!(
            payment_id = %payment.id,
            status = payment.payment_status.as_str(),
            outcome = outcome.as_path(),
            "Ignoring gateway return for settled payment"
        );
        return Ok(ReturnOutcome {
            message: format!("Payment already {}", payment.payment_status.as_str()),
            payment,
        });
    }

    let mut verdict = GatewayVerdict::Open;
    if let Some(validation_id) = form.val_id.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        let lookup = gateway.validate(validation_id).await.map(Some);
        let records = gateway_records(&payment, lookup)?;
        verdict = resolve(&payment.transaction_id, payment.amount, &records);
    }
    if verdict == GatewayVerdict::Open {
        let lookup = gateway.find_transactions(&payment.transaction_id).await;
        let records = gateway_records(&payment, lookup)?;
        verdict = resolve(&payment.transaction_id, payment.amount, &records);
    }

    let validation_id = match verdict {
        GatewayVerdict::Paid(validation_id) => validation_id,
        GatewayVerdict::AmountMismatch => {
            warn!(
                payment_id = %payment.id,
                transaction_id = %payment.transaction_id,
                "Gateway reports a different amount"
            );
            return close(store, payment, PaymentStatus::Failed, "Paid amount does not match").await;
        }
        GatewayVerdict::Failed => {
            return close(store, payment, PaymentStatus::Failed, "Payment failed").await
        }
        GatewayVerdict::Cancelled => {
            return close(store, payment, PaymentStatus::Cancelled, "Payment cancelled").await
        }
        GatewayVerdict::Open => {
            info!(
                payment_id = %payment.id,
                outcome = outcome.as_path(),
                reported = form.status.as_deref().unwrap_or(""),
                "Gateway has no final record, payment stays open"
            );
            return Ok(ReturnOutcome {
                payment,
                message: "Payment not completed".to_string(),
            });
        }
    };

    match store
        .settle_payment(payment.id, &PaymentStatus::GATEWAY_OPEN, Some(validation_id))
        .await?
    {
        Some(settlement) => {
            info!(
                payment_id = %settlement.payment.id,
                transaction_id = %settlement.payment.transaction_id,
                income_id = %settlement.income.id,
                promoted = settlement.promoted.is_some(),
                "Payment settled from gateway"
            );
            Ok(ReturnOutcome {
                payment: settlement.payment,
                message: "Payment successful".to_string(),
            })
        }
        None => current(store, payment.id).await,
    }
}

/// Gateway records from a lookup; refusals count as no record
fn gateway_records<R>(
    payment: &Payment,
    lookup: Result<R, GatewayError>,
) -> ServiceResult<Vec<GatewayValidation>>
where
    R: IntoIterator<Item = GatewayValidation>,
{
    match lookup {
        Ok(records) => Ok(records.into_iter().collect()),
        Err(GatewayError::Transport(e)) => {
            warn!(payment_id = %payment.id, error = %e, "Gateway unreachable");
            Err(ServiceError::GatewayUnavailable(e))
        }
        Err(e) => {
            warn!(payment_id = %payment.id, error = %e, "Gateway lookup refused");
            Ok(Vec::new())
        }
    }
}

async fn close(
    store: &dyn Store,
    payment: Payment,
    to: PaymentStatus,
    message: &str,
) -> ServiceResult<ReturnOutcome> {
    match store
        .close_payment(payment.id, to, &PaymentStatus::GATEWAY_OPEN)
        .await?
    {
        Some(payment) => {
            info!(payment_id = %payment.id, status = to.as_str(), "Payment closed");
            Ok(ReturnOutcome {
                payment,
                message: message.to_string(),
            })
        }
        None => current(store, payment.id).await,
    }
}

/// Re-reads a payment whose guarded transition lost a race
async fn current(store: &dyn Store, id: Uuid) -> ServiceResult<ReturnOutcome> {
    let payment = store
        .find_payment(id)
        .await?
        .ok_or(ServiceError::NotFound("Payment"))?;
    Ok(ReturnOutcome {
        message: format!("Payment already {}", payment.payment_status.as_str()),
        payment,
    })
}

/// Manually settles a PENDING payment
///
/// # Errors
///
/// - `Forbidden` below ADMIN
/// - `NotFound` for an unknown id
/// - `StateConflict` unless the payment is PENDING
pub async fn approve(store: &dyn Store, actor: &User, payment_id: Uuid) -> ServiceResult<Payment> {
    require_admin(actor)?;

    let payment = store
        .find_payment(payment_id)
        .await?
        .ok_or(ServiceError::NotFound("Payment"))?;

    if payment.payment_status != PaymentStatus::Pending {
        return Err(ServiceError::StateConflict(format!(
            "Only PENDING payments can be approved, this one is {}",
            payment.payment_status.as_str()
        )));
    }

    let settlement = store
        .settle_payment(payment_id, &PaymentStatus::AWAITING_APPROVAL, None)
        .await?
        .ok_or_else(|| ServiceError::StateConflict("Payment was settled concurrently".to_string()))?;

    info!(
        payment_id = %payment_id,
        approved_by = %actor.id,
        promoted = settlement.promoted.is_some(),
        "Payment approved manually"
    );

    Ok(settlement.payment)
}

/// The caller's own payments
pub async fn my_payments(
    store: &dyn Store,
    actor: &User,
    query: PaymentQuery,
) -> ServiceResult<Page<Payment>> {
    let filter = PaymentFilter {
        user_id: Some(actor.id),
        ..query.filter
    };
    Ok(store.list_payments(&filter, query.page).await?)
}

/// Every payment, with payer details, for administrators
pub async fn list_payments(
    store: &dyn Store,
    actor: &User,
    query: PaymentQuery,
) -> ServiceResult<Page<PaymentView>> {
    require_admin(actor)?;

    let page = store.list_payments(&query.filter, query.page).await?;
    let mut items = Vec::with_capacity(page.items.len());
    for payment in page.items {
        let user = store.find_user(payment.user_id).await?;
        items.push(PaymentView {
            user: user.as_ref().map(UserSummary::from),
            payment,
        });
    }

    Ok(Page {
        items,
        meta: page.meta,
    })
}

/// Invoice for one payment, visible to its payer and administrators
pub async fn invoice(store: &dyn Store, actor: &User, payment_id: Uuid) -> ServiceResult<Invoice> {
    let payment = store
        .find_payment(payment_id)
        .await?
        .ok_or(ServiceError::NotFound("Payment"))?;

    require_self_or_admin(actor, payment.user_id)?;

    let user = store.find_user(payment.user_id).await?;
    let project_name = match payment.project_id {
        Some(id) => store.find_project(id).await?.map(|p| p.name),
        None => None,
    };

    Ok(Invoice {
        purpose_label: payment.purpose.label(),
        user: user.as_ref().map(UserSummary::from),
        project_name,
        payment,
    })
}
