//! Payment gateway adapter.
//!
//! Payments are started against a provider and recorded as `pending`. The
//! provider later reports the outcome through a webhook (Pesapal) or a
//! callback (M-Pesa); settling the payment, moving the order and clearing the
//! owner's cart happen together in the store. A Pesapal webhook only names
//! the payment: its outcome is read back from the provider.
//!
//! # Providers
//!
//! - [`PesapalClient`]: redirect-based checkout
//! - [`MpesaClient`]: STK push to the customer's phone
//! - [`InMemoryGateway`]: accepts everything, for tests and local runs
//! - [`DisabledGateway`]: used when a provider has no credentials

pub mod gateway;
pub mod memory;
pub mod mpesa;
pub mod pesapal;

use std::sync::Arc;
use std::time::Duration;

use common::{OrderId, PaymentId};
use domain::{OrderStatus, Payment, PaymentMethod, PaymentOutcome, PaymentStatus};
use serde::Serialize;
use store::Store;

pub use gateway::{
    BillingDetails, DisabledGateway, GatewayError, PaymentGateway, PaymentHandle, PaymentRequest,
    RetryConfig, retry_with_backoff, with_timeout,
};
pub use memory::InMemoryGateway;
pub use mpesa::{MpesaCallback, MpesaClient, MpesaConfig, normalize_msisdn};
pub use pesapal::{PesapalClient, PesapalConfig, PesapalNotification};

use crate::actor::Actor;
use crate::error::{Result, ServiceError};

/// Default bound on a single provider call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// One gateway per payment method.
#[derive(Clone)]
pub struct PaymentGateways {
    pub pesapal: Arc<dyn PaymentGateway>,
    pub mpesa: Arc<dyn PaymentGateway>,
}

impl PaymentGateways {
    /// Every method rejects initiation.
    pub fn disabled() -> Self {
        Self {
            pesapal: Arc::new(DisabledGateway(PaymentMethod::Pesapal)),
            mpesa: Arc::new(DisabledGateway(PaymentMethod::Mpesa)),
        }
    }

    fn for_method(&self, method: PaymentMethod) -> &Arc<dyn PaymentGateway> {
        match method {
            PaymentMethod::Pesapal => &self.pesapal,
            PaymentMethod::Mpesa => &self.mpesa,
        }
    }
}

/// Returned to the customer after a payment was started.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
}

/// Acknowledgement of a provider notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationReceipt {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub payment_status: PaymentStatus,
    pub order_status: Option<OrderStatus>,
    /// False for replays and still-pending reports.
    pub updated: bool,
}

/// Payment state of an order as seen by its owner.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    pub payment: Option<Payment>,
}

#[derive(Clone)]
pub struct PaymentService<S> {
    store: S,
    gateways: PaymentGateways,
    timeout: Duration,
}

impl<S: Store> PaymentService<S> {
    pub fn new(store: S, gateways: PaymentGateways, timeout: Duration) -> Self {
        Self {
            store,
            gateways,
            timeout,
        }
    }

    /// Starts a payment for a pending order. Nothing is recorded unless the
    /// provider accepts the request.
    #[tracing::instrument(skip(self, billing))]
    pub async fn initiate_payment(
        &self,
        order_id: OrderId,
        actor: Actor,
        billing: BillingDetails,
        method: PaymentMethod,
    ) -> Result<PaymentInitiation> {
        let order = self
            .store
            .get_order(order_id, actor.owner_filter())
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Order {order_id}")))?;
        if !order.status.can_initiate_payment() {
            return Err(ServiceError::InvalidState(format!(
                "order is {}, payment can only be initiated for pending orders",
                order.status
            )));
        }

        let billing = match method {
            PaymentMethod::Mpesa => BillingDetails {
                phone: normalize_msisdn(&billing.phone)
                    .ok_or_else(|| ServiceError::validation("invalid phone number"))?,
                ..billing
            },
            PaymentMethod::Pesapal => billing,
        };
        let request = PaymentRequest {
            order_id,
            amount: order.total,
            description: format!("Payment for order {order_id}"),
            billing,
        };

        let gateway = self.gateways.for_method(method);
        let handle = with_timeout(self.timeout, gateway.initiate(&request))
            .await
            .inspect_err(|e| tracing::warn!(error = %e, %method, "payment initiation failed"))?;

        let payment = Payment::pending(order.id, order.total, method, handle.transaction_id.clone());
        self.store.insert_payment(&payment).await?;

        metrics::counter!("payments_initiated_total", "method" => method.as_str()).increment(1);
        tracing::info!(payment_id = %payment.id, transaction_id = %handle.transaction_id, "payment initiated");

        Ok(PaymentInitiation {
            payment_id: payment.id,
            order_id,
            method,
            transaction_id: handle.transaction_id,
            redirect_url: handle.redirect_url,
            customer_message: handle.customer_message,
        })
    }

    /// Applies a Pesapal IPN by asking the provider for the payment's status.
    /// In-progress statuses are acknowledged unchanged.
    #[tracing::instrument(skip(self, notification), fields(tracking_id = %notification.order_tracking_id))]
    pub async fn handle_webhook(&self, notification: PesapalNotification) -> Result<NotificationReceipt> {
        let payment = self.payment_by_reference(&notification.order_tracking_id).await?;
        if !payment.status.is_pending() {
            return self.already_settled(payment).await;
        }

        let gateway = self.gateways.for_method(payment.method);
        let outcome = with_timeout(
            self.timeout,
            gateway.transaction_status(&notification.order_tracking_id),
        )
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "payment status query failed"))?;

        match outcome {
            Some(outcome) => self.settle(payment, outcome).await,
            None => {
                tracing::debug!("payment still in progress");
                metrics::counter!("payment_notifications_total", "outcome" => "pending").increment(1);
                self.receipt(payment, false).await
            }
        }
    }

    #[tracing::instrument(skip(self, callback), fields(checkout_request_id = %callback.checkout_request_id()))]
    pub async fn handle_mpesa_callback(&self, callback: MpesaCallback) -> Result<NotificationReceipt> {
        let payment = self.payment_by_reference(callback.checkout_request_id()).await?;
        if callback.outcome() == PaymentOutcome::Failed {
            tracing::info!(
                result_code = callback.body.stk_callback.result_code,
                result_desc = %callback.body.stk_callback.result_desc,
                "stk push not completed"
            );
        }
        self.settle(payment, callback.outcome()).await
    }

    /// Marks a pending payment completed on behalf of the order's owner.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, payment_id: PaymentId, actor: Actor) -> Result<Payment> {
        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Payment {payment_id}")))?;
        let order = self
            .store
            .get_order(payment.order_id, None)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Order {}", payment.order_id)))?;
        if !actor.can_access(order.user_id) {
            return Err(ServiceError::Forbidden(
                "payment belongs to another user".to_string(),
            ));
        }
        if !payment.status.is_pending() {
            return Err(ServiceError::InvalidState(format!("payment is {}", payment.status)));
        }

        let (payment, _) = self
            .store
            .settle_payment(payment_id, PaymentOutcome::Completed)
            .await?
            .ok_or_else(|| ServiceError::InvalidState("payment is no longer pending".to_string()))?;

        metrics::counter!("payment_notifications_total", "outcome" => "confirmed").increment(1);
        tracing::info!(payment_id = %payment_id, "payment confirmed");
        Ok(payment)
    }

    /// Refunds the order's completed payment.
    #[tracing::instrument(skip(self))]
    pub async fn process_refund(&self, order_id: OrderId, reason: &str) -> Result<Payment> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::validation("refund reason is required"));
        }

        let payment = self
            .store
            .latest_payment_for_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Payment for order {order_id}")))?;
        if !payment.status.can_refund() {
            return Err(ServiceError::InvalidState(format!(
                "only completed payments can be refunded, payment is {}",
                payment.status
            )));
        }

        let refunded = self
            .store
            .refund_payment(payment.id, reason)
            .await?
            .ok_or_else(|| ServiceError::InvalidState("payment is no longer completed".to_string()))?;
        tracing::info!(payment_id = %refunded.id, "payment refunded");
        Ok(refunded)
    }

    pub async fn payment_status(&self, order_id: OrderId, actor: Actor) -> Result<PaymentStatusView> {
        let order = self
            .store
            .get_order(order_id, actor.owner_filter())
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Order {order_id}")))?;
        let payment = self.store.latest_payment_for_order(order_id).await?;
        Ok(PaymentStatusView {
            order_id,
            order_status: order.status,
            payment,
        })
    }

    pub async fn list_payments(&self) -> Result<Vec<Payment>> {
        Ok(self.store.list_payments().await?)
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Payment> {
        self.store
            .find_payment_by_transaction(reference)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Payment with reference {reference}")))
    }

    /// A notification for a payment that is already settled leaves it as is.
    async fn settle(&self, payment: Payment, outcome: PaymentOutcome) -> Result<NotificationReceipt> {
        match self.store.settle_payment(payment.id, outcome).await? {
            Some((payment, order)) => {
                metrics::counter!("payment_notifications_total", "outcome" => outcome.as_str())
                    .increment(1);
                tracing::info!(payment_id = %payment.id, order_status = %order.status, outcome = outcome.as_str(), "payment settled");
                Ok(NotificationReceipt {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    payment_status: payment.status,
                    order_status: Some(order.status),
                    updated: true,
                })
            }
            None => {
                let current = self
                    .store
                    .get_payment(payment.id)
                    .await?
                    .unwrap_or(payment);
                self.already_settled(current).await
            }
        }
    }

    async fn already_settled(&self, payment: Payment) -> Result<NotificationReceipt> {
        metrics::counter!("payment_notifications_total", "outcome" => "duplicate").increment(1);
        tracing::debug!(payment_id = %payment.id, "notification for settled payment ignored");
        self.receipt(payment, false).await
    }

    async fn receipt(&self, payment: Payment, updated: bool) -> Result<NotificationReceipt> {
        let order_status = self
            .store
            .get_order(payment.order_id, None)
            .await?
            .map(|order| order.status);
        Ok(NotificationReceipt {
            payment_id: payment.id,
            order_id: payment.order_id,
            payment_status: payment.status,
            order_status,
            updated,
        })
    }
}
