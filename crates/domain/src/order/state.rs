//! Order status machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// One vocabulary covers both payment and fulfillment:
/// ```text
/// Pending ──┬──► Paid ──► Shipped ──► Delivered
///           │  ▲
///           ├──┴── PaymentFailed
///           │
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, stock reserved, awaiting payment.
    #[default]
    Pending,

    /// Payment confirmed by the provider.
    Paid,

    /// The provider reported a failed payment.
    PaymentFailed,

    /// Handed over to the carrier.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,

    /// Cancelled and stock restored (terminal state).
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::PaymentFailed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Returns true if the customer may still cancel the order.
    ///
    /// A `PaymentFailed` order keeps its stock reserved until an admin moves
    /// it to `Cancelled`, which restocks.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if a payment may be initiated for the order.
    pub fn can_initiate_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if a provider notification may still move the order.
    pub fn awaits_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PaymentFailed)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Checks an administrative status change.
    pub fn check_transition(&self, to: OrderStatus) -> Result<(), DomainError> {
        if self.is_terminal() || *self == to {
            return Err(DomainError::InvalidTransition {
                entity: "order",
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::PaymentFailed => "payment_failed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus {
                entity: "order",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_only_pending_can_cancel() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(!OrderStatus::Paid.can_cancel());
        assert!(!OrderStatus::PaymentFailed.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_only_pending_can_initiate_payment() {
        for status in OrderStatus::ALL {
            assert_eq!(status.can_initiate_payment(), status == OrderStatus::Pending);
        }
    }

    #[test]
    fn test_awaits_payment() {
        assert!(OrderStatus::Pending.awaits_payment());
        assert!(OrderStatus::PaymentFailed.awaits_payment());
        assert!(!OrderStatus::Paid.awaits_payment());
        assert!(!OrderStatus::Cancelled.awaits_payment());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::PaymentFailed.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_cancelled_order_can_never_change() {
        for to in OrderStatus::ALL {
            assert!(OrderStatus::Cancelled.check_transition(to).is_err());
        }
    }

    #[test]
    fn test_non_terminal_orders_accept_other_statuses() {
        assert!(OrderStatus::Pending.check_transition(OrderStatus::Shipped).is_ok());
        assert!(OrderStatus::Pending.check_transition(OrderStatus::Delivered).is_ok());
        assert!(OrderStatus::Paid.check_transition(OrderStatus::Cancelled).is_ok());
        assert!(OrderStatus::Shipped.check_transition(OrderStatus::Shipped).is_err());
    }

    #[test]
    fn test_string_roundtrip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("completed".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PaymentFailed).unwrap();
        assert_eq!(json, "\"payment_failed\"");
    }
}
