//! The contract every payment provider client implements.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::OrderId;
use domain::{Money, PaymentMethod, PaymentOutcome};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to a payment provider.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an error status or error body.
    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider rejected our credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// No credentials are configured for this provider.
    #[error("{0} payments are not configured")]
    Disabled(PaymentMethod),

    /// The provider has no status lookup.
    #[error("{0} does not support status queries")]
    Unsupported(PaymentMethod),

    /// The provider did not answer in time.
    #[error("Request timed out")]
    Timeout,

    /// The provider answered with a body we could not use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Errors worth retrying: connection trouble, throttling and server faults.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(e) => e.is_connect() || e.is_timeout(),
            GatewayError::Api { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Timeout => true,
            _ => false,
        }
    }
}

/// Who is paying, as sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    pub email: String,
    pub phone: String,
    pub name: String,
}

impl BillingDetails {
    /// First and last name; a single word is used for both.
    pub fn split_name(&self) -> (String, String) {
        let mut parts = self.name.split_whitespace();
        let first = parts.next().unwrap_or_default().to_string();
        let rest = parts.collect::<Vec<_>>().join(" ");
        if rest.is_empty() {
            (first.clone(), first)
        } else {
            (first, rest)
        }
    }
}

/// A payment to be collected for an order.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub description: String,
    pub billing: BillingDetails,
}

/// What the provider returned when the payment was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandle {
    /// Provider reference used to match the later notification.
    pub transaction_id: String,
    /// Hosted payment page, for redirect-based providers.
    pub redirect_url: Option<String>,
    /// Message to show the customer, for push-based providers.
    pub customer_message: Option<String>,
}

/// A payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Starts a payment. Implementations must not retry this call.
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentHandle, GatewayError>;

    /// Asks the provider for the outcome of a payment. `None` while it is
    /// still in progress.
    async fn transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentOutcome>, GatewayError> {
        tracing::debug!(%transaction_id, method = %self.method(), "status query not supported");
        Err(GatewayError::Unsupported(self.method()))
    }
}

/// Stands in for a provider whose credentials are not configured.
#[derive(Debug, Clone, Copy)]
pub struct DisabledGateway(pub PaymentMethod);

#[async_trait]
impl PaymentGateway for DisabledGateway {
    fn method(&self) -> PaymentMethod {
        self.0
    }

    async fn initiate(&self, _request: &PaymentRequest) -> Result<PaymentHandle, GatewayError> {
        Err(GatewayError::Disabled(self.0))
    }

    async fn transaction_status(
        &self,
        _transaction_id: &str,
    ) -> Result<Option<PaymentOutcome>, GatewayError> {
        Err(GatewayError::Disabled(self.0))
    }
}

/// Backoff settings for idempotent provider calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, fails with a permanent error, or runs out of attempts.
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_attempts => {
                let delay = config.delay_for(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying provider call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bounds a provider call. Elapsed calls surface as [`GatewayError::Timeout`].
pub async fn with_timeout<T, Fut>(limit: Duration, fut: Fut) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, GatewayError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| GatewayError::Timeout)?
}

/// An access token with the instant it stops being usable.
#[derive(Debug, Clone)]
pub(crate) struct CachedToken {
    pub value: SecretString,
    pub expires_at: Instant,
}

impl CachedToken {
    /// Tokens are refreshed a minute before the provider expires them.
    const EARLY_REFRESH: Duration = Duration::from_secs(60);

    pub fn new(value: String, lifetime: Duration) -> Self {
        Self {
            value: SecretString::from(value),
            expires_at: Instant::now() + lifetime.saturating_sub(Self::EARLY_REFRESH),
        }
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Reads an error body for the message of a failed response.
pub(crate) async fn error_from_response(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    GatewayError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
        assert_eq!(config.delay_for(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GatewayError::Api {
                    status: 503,
                    message: "busy".to_string(),
                })
            } else {
                Ok("token")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "token");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&fast(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Auth("bad key".to_string()))
        })
        .await;

        assert!(matches!(result, Err(GatewayError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&fast(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Timeout)
        })
        .await;

        assert!(matches!(result, Err(GatewayError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout() {
        let slow = with_timeout(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, GatewayError>(())
        })
        .await;
        assert!(matches!(slow, Err(GatewayError::Timeout)));
    }

    #[test]
    fn test_split_name() {
        let billing = BillingDetails {
            email: "a@example.com".to_string(),
            phone: "254700000000".to_string(),
            name: "Grace Wanjiku Kamau".to_string(),
        };
        assert_eq!(
            billing.split_name(),
            ("Grace".to_string(), "Wanjiku Kamau".to_string())
        );

        let single = BillingDetails {
            name: "Grace".to_string(),
            ..billing
        };
        assert_eq!(single.split_name(), ("Grace".to_string(), "Grace".to_string()));
    }

    #[tokio::test]
    async fn test_disabled_gateway() {
        let gateway = DisabledGateway(PaymentMethod::Mpesa);
        let request = PaymentRequest {
            order_id: OrderId::new(),
            amount: Money::from_units(10),
            description: "test".to_string(),
            billing: BillingDetails {
                email: "a@example.com".to_string(),
                phone: "254700000000".to_string(),
                name: "Grace".to_string(),
            },
        };
        assert!(matches!(
            gateway.initiate(&request).await,
            Err(GatewayError::Disabled(PaymentMethod::Mpesa))
        ));
        assert!(matches!(
            gateway.transaction_status("ws_CO_1").await,
            Err(GatewayError::Disabled(PaymentMethod::Mpesa))
        ));
    }
}
