//! Workflow services for the storefront backend.
//!
//! Every service is a small struct over one shared [`store::Store`] handle:
//!
//! - [`CatalogService`] and [`SearchService`] for products and categories
//! - [`CartService`], which owns an [`OrderService`] for checkout
//! - [`PaymentService`] with its provider gateways
//! - [`ShippingService`] for delivery tracking
//! - [`AccountService`] for users, credentials and the admin dashboard
//!
//! Ownership checks take an [`Actor`]; admins see every record.

pub mod accounts;
pub mod actor;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod orders;
pub mod payments;
pub mod search;
pub mod shipping;

#[cfg(test)]
mod test_support;

pub use accounts::{
    AccountService, DashboardStats, LogNotifier, NewUser, Notifier, NotifyError, UserPatch,
    UserUpdate,
};
pub use actor::Actor;
pub use cart::CartService;
pub use catalog::{CatalogService, CategoryPatch, NewCategory, ProductGroup};
pub use error::{Result, ServiceError};
pub use orders::OrderService;
pub use payments::{
    BillingDetails, NotificationReceipt, PaymentGateways, PaymentInitiation, PaymentService,
    PaymentStatusView,
};
pub use search::SearchService;
pub use shipping::ShippingService;
