//! Safaricom Daraja STK push client.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, Utc};
use domain::{PaymentMethod, PaymentOutcome};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::instrument;

use super::gateway::{
    CachedToken, GatewayError, PaymentGateway, PaymentHandle, PaymentRequest, RetryConfig,
    error_from_response, retry_with_backoff,
};

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
/// Daraja timestamps are East Africa Time.
const EAT_OFFSET_SECS: i32 = 3 * 3600;

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub passkey: SecretString,
    pub shortcode: String,
    pub callback_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds, sent as a string.
    expires_in: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushRequest<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: i64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    call_back_url: &'a str,
    account_reference: String,
    transaction_desc: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    response_code: String,
    response_description: String,
    #[serde(default)]
    customer_message: Option<String>,
}

/// Result callback posted by Daraja once the customer answers the prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct MpesaCallback {
    #[serde(rename = "Body")]
    pub body: MpesaCallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpesaCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
}

impl MpesaCallback {
    pub fn checkout_request_id(&self) -> &str {
        &self.body.stk_callback.checkout_request_id
    }

    /// Result code 0 is the only success.
    pub fn outcome(&self) -> PaymentOutcome {
        if self.body.stk_callback.result_code == 0 {
            PaymentOutcome::Completed
        } else {
            PaymentOutcome::Failed
        }
    }
}

/// Converts a Kenyan phone number to the `2547XXXXXXXX` form Daraja expects.
pub fn normalize_msisdn(phone: &str) -> Option<String> {
    let digits: String = phone
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match digits.len() {
        10 if digits.starts_with('0') => format!("254{}", &digits[1..]),
        9 => format!("254{digits}"),
        12 if digits.starts_with("254") => digits,
        _ => return None,
    };
    Some(normalized)
}

fn timestamp(now: DateTime<Utc>) -> String {
    const FORMAT: &str = "%Y%m%d%H%M%S";
    match FixedOffset::east_opt(EAT_OFFSET_SECS) {
        Some(eat) => now.with_timezone(&eat).format(FORMAT).to_string(),
        None => now.format(FORMAT).to_string(),
    }
}

/// `base64(shortcode + passkey + timestamp)`
fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

pub struct MpesaClient {
    client: reqwest::Client,
    config: MpesaConfig,
    retry: RetryConfig,
    token: RwLock<Option<CachedToken>>,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig, timeout: Duration) -> Result<Self, GatewayError> {
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
            .get(self.url("/oauth/v1/generate?grant_type=client_credentials"))
            .basic_auth(
                &self.config.consumer_key,
                Some(self.config.consumer_secret.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Invalid credentials".to_string());
            return Err(GatewayError::Auth(text));
        }
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = body
            .expires_in
            .trim()
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| GatewayError::InvalidResponse(format!("expires_in: {}", body.expires_in)))?;
        Ok(CachedToken::new(body.access_token, lifetime))
    }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Mpesa
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentHandle, GatewayError> {
        let token = self.access_token().await?;
        let timestamp = timestamp(Utc::now());
        let shortcode = self.config.shortcode.as_str();
        let phone = request.billing.phone.as_str();

        let response = self
            .client
            .post(self.url("/mpesa/stkpush/v1/processrequest"))
            .bearer_auth(token.expose_secret())
            .json(&StkPushRequest {
                business_short_code: shortcode,
                password: stk_password(shortcode, self.config.passkey.expose_secret(), &timestamp),
                timestamp,
                transaction_type: TRANSACTION_TYPE,
                amount: request.amount.units_rounded_up(),
                party_a: phone,
                party_b: shortcode,
                phone_number: phone,
                call_back_url: &self.config.callback_url,
                account_reference: format!("Order-{}", request.order_id),
                transaction_desc: &request.description,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: StkPushResponse = response.json().await?;
        if body.response_code != "0" {
            return Err(GatewayError::Api {
                status: 400,
                message: body.response_description,
            });
        }

        tracing::info!(checkout_request_id = %body.checkout_request_id, "stk push sent");
        Ok(PaymentHandle {
            transaction_id: body.checkout_request_id,
            redirect_url: None,
            customer_message: body.customer_message.or(Some(body.response_description)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_msisdn() {
        assert_eq!(normalize_msisdn("0712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_msisdn("+254 712 345 678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_msisdn("712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_msisdn("254712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_msisdn("07123"), None);
        assert_eq!(normalize_msisdn("07123abc78"), None);
    }

    #[test]
    fn test_timestamp_is_east_africa_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 22, 15, 9).unwrap();
        assert_eq!(timestamp(now), "20240302011509");
    }

    #[test]
    fn test_stk_password() {
        let password = stk_password("174379", "passkey", "20240302011509");
        let decoded = STANDARD.decode(password).unwrap();
        assert_eq!(decoded, b"174379passkey20240302011509");
    }

    #[test]
    fn test_callback_parsing() {
        let callback: MpesaCallback = serde_json::from_value(serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user"
                }
            }
        }))
        .unwrap();

        assert_eq!(callback.checkout_request_id(), "ws_CO_191220191020363925");
        assert_eq!(callback.outcome(), PaymentOutcome::Failed);
    }

    #[test]
    fn test_callback_success_code() {
        let callback: MpesaCallback = serde_json::from_value(serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "1",
                    "CheckoutRequestID": "ws_CO_1",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": { "Item": [] }
                }
            }
        }))
        .unwrap();
        assert_eq!(callback.outcome(), PaymentOutcome::Completed);
    }
}
