//! Payment initiation, provider notifications and refunds.
//!
//! `/payments/webhook` and `/payments/mpesa/callback` are called by the
//! providers and take no bearer token. Every other route does.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{OrderId, PaymentId};
use domain::{Payment, PaymentMethod};
use serde::{Deserialize, Serialize};
use services::payments::{MpesaCallback, PesapalNotification};
use services::{BillingDetails, NotificationReceipt, PaymentInitiation, PaymentStatusView};
use store::Store;

use super::{JsonBody, PathParam};
use crate::AppState;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/payments/initiate", post(initiate::<S>))
        .route("/payments/mpesa/initiate", post(initiate_mpesa::<S>))
        .route("/payments/confirm/{id}", post(confirm::<S>))
        .route("/payments/webhook", post(webhook::<S>))
        .route("/payments/mpesa/callback", post(mpesa_callback::<S>))
        .route("/payments/status/{order_id}", get(status::<S>))
        .route("/payments/all", get(list_all::<S>))
        .route("/payments/refund/{order_id}", post(refund::<S>))
}

#[derive(Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: OrderId,
    pub phone: String,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub reason: String,
}

/// Acknowledgement in the shape Daraja expects from a callback URL.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackAck {
    pub result_code: u8,
    pub result_desc: &'static str,
}

async fn start_payment<S: Store>(
    state: &AppState<S>,
    current: CurrentUser,
    req: InitiatePaymentRequest,
    method: PaymentMethod,
) -> Result<Json<PaymentInitiation>, ApiError> {
    if req.phone.trim().is_empty() {
        return Err(ApiError::BadRequest("Phone number is required".to_string()));
    }
    let billing = BillingDetails {
        email: current.user.email.clone(),
        phone: req.phone,
        name: current.user.name.clone(),
    };
    let initiation = state
        .payments
        .initiate_payment(req.order_id, current.actor(), billing, method)
        .await?;
    Ok(Json(initiation))
}

/// POST /payments/initiate. Returns the Pesapal redirect URL.
pub async fn initiate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(req): JsonBody<InitiatePaymentRequest>,
) -> Result<Json<PaymentInitiation>, ApiError> {
    start_payment(&state, current, req, PaymentMethod::Pesapal).await
}

/// POST /payments/mpesa/initiate. Sends an STK push to the given phone.
pub async fn initiate_mpesa<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(req): JsonBody<InitiatePaymentRequest>,
) -> Result<Json<PaymentInitiation>, ApiError> {
    start_payment(&state, current, req, PaymentMethod::Mpesa).await
}

/// POST /payments/confirm/{id}
pub async fn confirm<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(id): PathParam<PaymentId>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.payments.confirm_payment(id, current.actor()).await?))
}

/// POST /payments/webhook (Pesapal IPN). Safe to replay.
pub async fn webhook<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(notification): JsonBody<PesapalNotification>,
) -> Result<Json<NotificationReceipt>, ApiError> {
    Ok(Json(state.payments.handle_webhook(notification).await?))
}

/// POST /payments/mpesa/callback. Safe to replay.
pub async fn mpesa_callback<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(callback): JsonBody<MpesaCallback>,
) -> Result<Json<CallbackAck>, ApiError> {
    let receipt = state.payments.handle_mpesa_callback(callback).await?;
    tracing::debug!(payment_id = %receipt.payment_id, updated = receipt.updated, "mpesa callback handled");
    Ok(Json(CallbackAck {
        result_code: 0,
        result_desc: "Accepted",
    }))
}

/// GET /payments/status/{order_id}
pub async fn status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(order_id): PathParam<OrderId>,
) -> Result<Json<PaymentStatusView>, ApiError> {
    Ok(Json(
        state
            .payments
            .payment_status(order_id, current.actor())
            .await?,
    ))
}

/// GET /payments/all
pub async fn list_all<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(state.payments.list_payments().await?))
}

/// POST /payments/refund/{order_id}
pub async fn refund<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(order_id): PathParam<OrderId>,
    JsonBody(req): JsonBody<RefundRequest>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(
        state.payments.process_refund(order_id, &req.reason).await?,
    ))
}
