//! Service error types.

use common::ProductId;
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

use crate::payments::GatewayError;

/// Errors raised by the workflow services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The entity does not exist, or is not visible to the caller.
    #[error("{0} not found")]
    NotFound(String),

    /// Missing or invalid credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is known but may not act on the entity.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The entity's current status does not allow the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The requested status change is not allowed.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The order is no longer pending or does not belong to the caller.
    #[error("Order cannot be cancelled: {0}")]
    NotCancellable(String),

    /// A product has fewer units than requested.
    #[error("Insufficient stock for product {0}")]
    InsufficientStock(ProductId),

    /// Checkout was attempted with no items in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// A uniqueness rule rejected the write.
    #[error("{0}")]
    AlreadyExists(String),

    /// The record can no longer be edited.
    #[error("{0}")]
    Locked(String),

    /// Other records still depend on the entity.
    #[error("{0}")]
    HasDependents(String),

    /// Malformed input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The payment provider rejected or failed the request.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// The payment provider did not answer in time.
    #[error("Payment gateway timed out")]
    GatewayTimeout,

    /// Persistence failure.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Any other failure that is not the caller's fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(what.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition { from, to, .. } => {
                ServiceError::InvalidTransition { from, to }
            }
            DomainError::Validation(message) => ServiceError::Validation(message),
            DomainError::UnknownStatus { .. } => ServiceError::Validation(err.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock(id) => ServiceError::InsufficientStock(id),
            StoreError::ProductNotFound(id) => ServiceError::NotFound(format!("Product {id}")),
            StoreError::Conflict(message) => ServiceError::AlreadyExists(message),
            other => ServiceError::Store(other),
        }
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout => ServiceError::GatewayTimeout,
            other => ServiceError::Gateway(other.to_string()),
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_transition_keeps_both_ends() {
        let err: ServiceError = DomainError::InvalidTransition {
            entity: "shipping",
            from: "pending".to_string(),
            to: "delivered".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid transition from pending to delivered");
    }

    #[test]
    fn store_stock_error_is_not_wrapped() {
        let id = ProductId::new();
        let err: ServiceError = StoreError::InsufficientStock(id).into();
        assert!(matches!(err, ServiceError::InsufficientStock(p) if p == id));
    }

    #[test]
    fn store_conflict_becomes_already_exists() {
        let err: ServiceError = StoreError::Conflict("email taken".to_string()).into();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));
    }

    #[test]
    fn gateway_timeout_is_distinct() {
        let err: ServiceError = GatewayError::Timeout.into();
        assert!(matches!(err, ServiceError::GatewayTimeout));
    }
}
