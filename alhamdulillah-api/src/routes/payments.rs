//! Payment endpoints
//!
//! # Endpoints
//!
//! - `POST /api/payments/initiate` - Start a payment, returns the gateway URL
//! - `GET /api/payments` - Every payment with payer details (ADMIN+)
//! - `GET /api/payments/my-payments` - The caller's payments
//! - `PATCH /api/payments/:id/approve` - Settle a PENDING payment by hand (ADMIN+)
//! - `GET /api/payments/invoice/:id` - Invoice for the payer or an admin
//! - `POST /api/payments/callback/{success,fail,cancel}` - Browser returns
//!   from the gateway, answered with `303 See Other` to the client dashboard
//! - `POST /api/payments/callback/ipn` - Server-to-server notification
//!
//! Gateway callbacks are public and form encoded. They never trust the
//! posted amount or status: every status change is backed by the gateway's
//! own records. The IPN answers with a bare acknowledgement, never the
//! payment record.

use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiQuery},
    response::{ApiResponse, CacheTag},
};
use alhamdulillah_shared::{
    auth::middleware::AuthContext,
    models::payment::{Payment, PaymentFilter, PaymentPurpose, PaymentSortField, PaymentStatus},
    pagination::{PageRequest, SortOrder},
    services::payments::{
        self, GatewayOutcome, GatewayReturn, InitiatePayment, InitiatedPayment, Invoice,
        PaymentQuery, PaymentView, ReturnOutcome,
    },
    services::ServiceError,
};
use axum::{
    extract::{Path, State},
    response::Redirect,
    Form,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: u32 = 10;

/// Every mutation that can settle a payment also moves the ledger and may
/// promote the payer
const SETTLEMENT_TAGS: [CacheTag; 4] = [
    CacheTag::Payment,
    CacheTag::Fund,
    CacheTag::Auth,
    CacheTag::User,
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub payment_status: Option<PaymentStatus>,
    pub purpose: Option<PaymentPurpose>,
    /// Admin listing only
    pub user_id: Option<Uuid>,
    pub sort_by: Option<PaymentSortField>,
    pub sort_order: Option<SortOrder>,
}

impl From<PaymentListQuery> for PaymentQuery {
    fn from(query: PaymentListQuery) -> Self {
        PaymentQuery {
            filter: PaymentFilter {
                user_id: query.user_id,
                status: query.payment_status,
                purpose: query.purpose,
                sort_by: query.sort_by.unwrap_or_default(),
                sort_order: query.sort_order.unwrap_or_default(),
            },
            page: PageRequest::new(query.page, query.limit, DEFAULT_PAGE_SIZE),
        }
    }
}

pub async fn initiate(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<InitiatePayment>,
) -> ApiResult<ApiResponse<InitiatedPayment>> {
    let initiated = payments::initiate(
        state.store.as_ref(),
        state.gateway.as_ref(),
        &state.payment_settings(),
        &auth.user,
        input,
    )
    .await?;

    Ok(ApiResponse::created("Payment initiated", initiated).invalidates(&[CacheTag::Payment]))
}

pub async fn list_payments(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<PaymentListQuery>,
) -> ApiResult<ApiResponse<Vec<PaymentView>>> {
    let page = payments::list_payments(state.store.as_ref(), &auth.user, query.into()).await?;
    Ok(ApiResponse::page("Payments fetched", page))
}

pub async fn my_payments(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<PaymentListQuery>,
) -> ApiResult<ApiResponse<Vec<Payment>>> {
    let page = payments::my_payments(state.store.as_ref(), &auth.user, query.into()).await?;
    Ok(ApiResponse::page("Payments fetched", page))
}

pub async fn approve(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<Payment>> {
    let payment = payments::approve(state.store.as_ref(), &auth.user, id).await?;
    Ok(ApiResponse::ok("Payment approved", payment).invalidates(&SETTLEMENT_TAGS))
}

pub async fn invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<Invoice>> {
    let invoice = payments::invoice(state.store.as_ref(), &auth.user, id).await?;
    Ok(ApiResponse::ok("Invoice fetched", invoice))
}

pub async fn callback_success(
    State(state): State<AppState>,
    Form(form): Form<GatewayReturn>,
) -> Redirect {
    browser_return(&state, GatewayOutcome::Success, form).await
}

pub async fn callback_fail(
    State(state): State<AppState>,
    Form(form): Form<GatewayReturn>,
) -> Redirect {
    browser_return(&state, GatewayOutcome::Fail, form).await
}

pub async fn callback_cancel(
    State(state): State<AppState>,
    Form(form): Form<GatewayReturn>,
) -> Redirect {
    browser_return(&state, GatewayOutcome::Cancel, form).await
}

/// Body of an IPN answer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpnAck {
    pub transaction_id: String,
    pub payment_status: PaymentStatus,
}

/// Instant payment notification
pub async fn callback_ipn(
    State(state): State<AppState>,
    Form(form): Form<GatewayReturn>,
) -> ApiResult<ApiResponse<IpnAck>> {
    let ReturnOutcome { payment, message } = payments::handle_gateway_return(
        state.store.as_ref(),
        state.gateway.as_ref(),
        GatewayOutcome::Ipn,
        form,
    )
    .await?;

    let ack = IpnAck {
        transaction_id: payment.transaction_id,
        payment_status: payment.payment_status,
    };
    Ok(ApiResponse::ok(message, ack).invalidates(&SETTLEMENT_TAGS))
}

/// Processes a browser return and sends the customer to the dashboard
///
/// Errors are reported to the browser as `status=FAILED` with the error
/// message; the payment itself is left as the service left it.
async fn browser_return(state: &AppState, outcome: GatewayOutcome, form: GatewayReturn) -> Redirect {
    let posted_tran_id = form.tran_id.clone().unwrap_or_default();
    let posted_amount = form.amount.clone().unwrap_or_default();

    let result = payments::handle_gateway_return(
        state.store.as_ref(),
        state.gateway.as_ref(),
        outcome,
        form,
    )
    .await;

    let target = match result {
        Ok(ReturnOutcome { payment, message }) => dashboard_redirect(
            &state.config.dashboard_url(),
            payment.payment_status.as_str(),
            &payment.transaction_id,
            &payment.amount.to_string(),
            &message,
        ),
        Err(err) => {
            tracing::warn!(
                transaction_id = %posted_tran_id,
                outcome = outcome.as_path(),
                error = %err,
                "Gateway return could not be processed"
            );
            let message = match &err {
                ServiceError::Store(_) => "Payment could not be processed".to_string(),
                other => other.to_string(),
            };
            dashboard_redirect(
                &state.config.dashboard_url(),
                PaymentStatus::Failed.as_str(),
                &posted_tran_id,
                &posted_amount,
                &message,
            )
        }
    };

    Redirect::to(&target)
}

/// `{dashboard}?status=…&tranId=…&amount=…&message=…`
fn dashboard_redirect(
    dashboard_url: &str,
    status: &str,
    transaction_id: &str,
    amount: &str,
    message: &str,
) -> String {
    let params = [
        ("status", status),
        ("tranId", transaction_id),
        ("amount", amount),
        ("message", message),
    ];

    match url::Url::parse_with_params(dashboard_url, &params) {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::error!(error = %e, dashboard_url, "Invalid dashboard URL");
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&params)
                .finish();
            format!("/dashboard?{query}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_redirect_encodes_message() {
        let target = dashboard_redirect(
            "http://localhost:3000/dashboard",
            "PAID",
            "TXN-1",
            "1000",
            "Payment successful & recorded",
        );
        assert_eq!(
            target,
            "http://localhost:3000/dashboard?status=PAID&tranId=TXN-1&amount=1000&message=Payment+successful+%26+recorded"
        );
    }

    #[test]
    fn test_list_query_defaults() {
        let query: PaymentQuery = PaymentListQuery::default().into();
        assert_eq!(query.filter.sort_by, PaymentSortField::CreatedAt);
        assert_eq!(query.filter.sort_order, SortOrder::Desc);
        assert_eq!(query.page.limit(), DEFAULT_PAGE_SIZE as i64);
    }
}
