//! Pesapal v3 client.
//!
//! Payments are started by submitting an order request; the customer is then
//! redirected to Pesapal's hosted page. Pesapal later posts an IPN carrying
//! only the order tracking id, and the outcome is read back through
//! `GetTransactionStatus`.

use std::time::Duration;

use async_trait::async_trait;
use domain::{Money, PaymentMethod, PaymentOutcome};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::instrument;

use super::gateway::{
    CachedToken, GatewayError, PaymentGateway, PaymentHandle, PaymentRequest, RetryConfig,
    error_from_response, retry_with_backoff,
};

/// Pesapal tokens are valid for five minutes.
const TOKEN_LIFETIME: Duration = Duration::from_secs(5 * 60);
const COUNTRY_CODE: &str = "KE";

#[derive(Debug, Clone)]
pub struct PesapalConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    /// Registered IPN id that Pesapal notifies for every order.
    pub notification_id: String,
    /// Where Pesapal sends the customer after payment.
    pub callback_url: String,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    consumer_key: &'a str,
    consumer_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiErrorBody {
    fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.code.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[derive(Serialize)]
struct SubmitOrderRequest<'a> {
    id: String,
    currency: &'static str,
    amount: f64,
    description: &'a str,
    callback_url: &'a str,
    notification_id: &'a str,
    billing_address: BillingAddress<'a>,
}

#[derive(Serialize)]
struct BillingAddress<'a> {
    email_address: &'a str,
    phone_number: &'a str,
    country_code: &'static str,
    first_name: String,
    last_name: String,
}

#[derive(Deserialize)]
struct SubmitOrderResponse {
    order_tracking_id: Option<String>,
    redirect_url: Option<String>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

/// IPN payload posted by Pesapal when a payment changes state.
///
/// The payload is unauthenticated and carries no status, so it only says
/// which payment to look up.
#[derive(Debug, Clone, Deserialize)]
pub struct PesapalNotification {
    #[serde(alias = "OrderTrackingId")]
    pub order_tracking_id: String,
    #[serde(default, alias = "OrderMerchantReference")]
    pub order_merchant_reference: Option<String>,
    #[serde(default, alias = "OrderNotificationType")]
    pub order_notification_type: Option<String>,
}

#[derive(Deserialize)]
struct TransactionStatusResponse {
    #[serde(default)]
    payment_status_description: Option<String>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

/// `None` while Pesapal still reports the payment as in progress.
fn outcome_from_description(description: &str) -> Option<PaymentOutcome> {
    match description.trim().to_lowercase().as_str() {
        "completed" => Some(PaymentOutcome::Completed),
        "failed" | "invalid" | "reversed" => Some(PaymentOutcome::Failed),
        _ => None,
    }
}

/// Pesapal amounts are decimal numbers in major units.
fn decimal_amount(amount: Money) -> f64 {
    amount.cents() as f64 / 100.0
}

pub struct PesapalClient {
    client: reqwest::Client,
    config: PesapalConfig,
    retry: RetryConfig,
    token: RwLock<Option<CachedToken>>,
}

impl PesapalClient {
    pub fn new(config: PesapalConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config,
            retry: RetryConfig::default(),
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Returns a cached token, requesting a new one when it is stale.
    async fn access_token(&self) -> Result<SecretString, GatewayError> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let fresh = retry_with_backoff(&self.retry, || self.request_token()).await?;
        let value = fresh.value.clone();
        *self.token.write().await = Some(fresh);
        Ok(value)
    }

    #[instrument(skip(self))]
    async fn request_token(&self) -> Result<CachedToken, GatewayError> {
        let response = self
            .client
            .post(self.url("/api/Auth/RequestToken"))
            .json(&TokenRequest {
                consumer_key: &self.config.consumer_key,
                consumer_secret: self.config.consumer_secret.expose_secret(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: TokenResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(GatewayError::Auth(error.describe()));
        }
        let token = body
            .token
            .ok_or_else(|| GatewayError::InvalidResponse("token missing".to_string()))?;
        Ok(CachedToken::new(token, TOKEN_LIFETIME))
    }

    #[instrument(skip(self))]
    async fn request_status(&self, transaction_id: &str) -> Result<Option<PaymentOutcome>, GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.url("/api/Transactions/GetTransactionStatus"))
            .query(&[("orderTrackingId", transaction_id)])
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: TransactionStatusResponse = response.json().await?;
        if let Some(error) = body.error.filter(|e| e.code.is_some() || e.message.is_some()) {
            return Err(GatewayError::Api {
                status: 400,
                message: error.describe(),
            });
        }
        let description = body.payment_status_description.ok_or_else(|| {
            GatewayError::InvalidResponse("payment_status_description missing".to_string())
        })?;
        Ok(outcome_from_description(&description))
    }
}

#[async_trait]
impl PaymentGateway for PesapalClient {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Pesapal
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentHandle, GatewayError> {
        let token = self.access_token().await?;
        let (first_name, last_name) = request.billing.split_name();

        let response = self
            .client
            .post(self.url("/api/Transactions/SubmitOrderRequest"))
            .bearer_auth(token.expose_secret())
            .json(&SubmitOrderRequest {
                id: request.order_id.to_string(),
                currency: Money::CURRENCY,
                amount: decimal_amount(request.amount),
                description: &request.description,
                callback_url: &self.config.callback_url,
                notification_id: &self.config.notification_id,
                billing_address: BillingAddress {
                    email_address: &request.billing.email,
                    phone_number: &request.billing.phone,
                    country_code: COUNTRY_CODE,
                    first_name,
                    last_name,
                },
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: SubmitOrderResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(GatewayError::Api {
                status: 400,
                message: error.describe(),
            });
        }
        let transaction_id = body.order_tracking_id.ok_or_else(|| {
            GatewayError::InvalidResponse("order_tracking_id missing".to_string())
        })?;

        tracing::info!(%transaction_id, "pesapal order submitted");
        Ok(PaymentHandle {
            transaction_id,
            redirect_url: body.redirect_url,
            customer_message: None,
        })
    }

    /// Status lookups are read-only, so transient failures are retried.
    async fn transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentOutcome>, GatewayError> {
        retry_with_backoff(&self.retry, || self.request_status(transaction_id)).await
    }
}
