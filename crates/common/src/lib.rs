//! Shared types for the storefront backend.

pub mod pagination;
pub mod types;

pub use pagination::{Page, PageRequest};
pub use types::{
    CartId, CartItemId, CategoryId, OrderId, OrderItemId, PaymentId, ProductId, ShippingId, UserId,
};
