//! Shipping records and the delivery status machine.

use chrono::{DateTime, Utc};
use common::{OrderId, ShippingId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Money;

/// Delivery progress. Moves forward one step at a time:
///
/// ```text
/// Pending ──► Shipped ──► OutForDelivery ──► Delivered
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    #[default]
    Pending,
    Shipped,
    OutForDelivery,
    Delivered,
}

impl ShippingStatus {
    pub const ALL: [ShippingStatus; 4] = [
        ShippingStatus::Pending,
        ShippingStatus::Shipped,
        ShippingStatus::OutForDelivery,
        ShippingStatus::Delivered,
    ];

    /// The only status reachable from this one, if any.
    pub fn next(&self) -> Option<ShippingStatus> {
        match self {
            ShippingStatus::Pending => Some(ShippingStatus::Shipped),
            ShippingStatus::Shipped => Some(ShippingStatus::OutForDelivery),
            ShippingStatus::OutForDelivery => Some(ShippingStatus::Delivered),
            ShippingStatus::Delivered => None,
        }
    }

    pub fn check_transition(&self, to: ShippingStatus) -> Result<(), DomainError> {
        if self.next() == Some(to) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                entity: "shipping",
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Address details may only change before the parcel leaves.
    pub fn is_editable(&self) -> bool {
        matches!(self, ShippingStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingStatus::Pending => "pending",
            ShippingStatus::Shipped => "shipped",
            ShippingStatus::OutForDelivery => "out_for_delivery",
            ShippingStatus::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for ShippingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ShippingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShippingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus {
                entity: "shipping",
                value: s.to_string(),
            })
    }
}

/// Destination details supplied by the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

impl ShippingDetails {
    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in [
            ("address", &self.address),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("phone", &self.phone),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::validation(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// Partial update of the destination details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingPatch {
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

impl ShippingPatch {
    pub fn apply(self, mut details: ShippingDetails) -> Result<ShippingDetails, DomainError> {
        if let Some(address) = self.address {
            details.address = address;
        }
        if let Some(city) = self.city {
            details.city = city;
        }
        if let Some(postal_code) = self.postal_code {
            details.postal_code = postal_code;
        }
        if let Some(phone) = self.phone {
            details.phone = phone;
        }
        if let Some(estimated_delivery) = self.estimated_delivery {
            details.estimated_delivery = Some(estimated_delivery);
        }
        details.validate()?;
        Ok(details)
    }
}

/// The shipping record of an order. At most one exists per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipping {
    pub id: ShippingId,
    pub order_id: OrderId,
    #[serde(flatten)]
    pub details: ShippingDetails,
    pub status: ShippingStatus,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipping {
    pub fn new(order_id: OrderId, details: ShippingDetails) -> Result<Self, DomainError> {
        details.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: ShippingId::new(),
            order_id,
            details,
            status: ShippingStatus::Pending,
            tracking_number: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Flat delivery rate for a destination city.
pub fn shipping_cost(city: &str) -> Money {
    match city.trim().to_lowercase().as_str() {
        "nairobi" => Money::from_units(200),
        "mombasa" => Money::from_units(500),
        "kisumu" => Money::from_units(450),
        _ => Money::from_units(600),
    }
}
