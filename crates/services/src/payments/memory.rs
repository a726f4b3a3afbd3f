//! In-memory payment gateway for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use domain::{PaymentMethod, PaymentOutcome};

use super::gateway::{GatewayError, PaymentGateway, PaymentHandle, PaymentRequest};

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    requests: Vec<(String, OrderId)>,
    next_id: u32,
    fail_on_initiate: bool,
    delay: Option<Duration>,
    outcomes: HashMap<String, PaymentOutcome>,
}

/// Accepts every payment with sequential references like `PAY-0001`.
///
/// Status queries report a payment as in progress until an outcome is set
/// with [`InMemoryGateway::set_outcome`].
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    method: PaymentMethod,
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every following initiation fail like a provider rejection.
    pub fn set_fail_on_initiate(&self, fail: bool) {
        self.state().fail_on_initiate = fail;
    }

    /// Delays every following initiation, to exercise request timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    /// Scripts the provider's answer for a reference.
    pub fn set_outcome(&self, reference: &str, outcome: PaymentOutcome) {
        self.state().outcomes.insert(reference.to_string(), outcome);
    }

    /// Number of payments started so far.
    pub fn initiated_count(&self) -> usize {
        self.state().requests.len()
    }

    /// The reference handed out for the most recent payment.
    pub fn last_reference(&self) -> Option<String> {
        self.state().requests.last().map(|(reference, _)| reference.clone())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentHandle, GatewayError> {
        let (delay, fail) = {
            let state = self.state();
            (state.delay, state.fail_on_initiate)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(GatewayError::Api {
                status: 400,
                message: "Payment declined".to_string(),
            });
        }

        let mut state = self.state();
        state.next_id += 1;
        let reference = format!("PAY-{:04}", state.next_id);
        state.requests.push((reference.clone(), request.order_id));

        let handle = match self.method {
            PaymentMethod::Pesapal => PaymentHandle {
                transaction_id: reference.clone(),
                redirect_url: Some(format!("https://pay.example.test/{reference}")),
                customer_message: None,
            },
            PaymentMethod::Mpesa => PaymentHandle {
                transaction_id: reference,
                redirect_url: None,
                customer_message: Some("Success. Request accepted for processing".to_string()),
            },
        };
        Ok(handle)
    }

    async fn transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentOutcome>, GatewayError> {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state().outcomes.get(transaction_id).copied())
    }
}
