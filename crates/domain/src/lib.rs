//! Domain layer for the storefront backend.
//!
//! This crate holds the entities and the rules that need no I/O:
//! - Value objects (`Money`) and quantity limits
//! - Catalog entities and the category tree
//! - Cart, order, payment and shipping models with their status machines
//! - Users, roles and credential validation
//! - Product search criteria

pub mod cart;
pub mod catalog;
pub mod error;
pub mod order;
pub mod payment;
pub mod search;
pub mod shipping;
pub mod user;
pub mod value_objects;

pub use cart::{Cart, CartItem, CartLine, CartView};
pub use catalog::{
    Category, CategoryNode, NewProduct, Product, ProductPatch, build_category_tree,
};
pub use error::DomainError;
pub use order::{Order, OrderItem, OrderStatus};
pub use payment::{Payment, PaymentMethod, PaymentOutcome, PaymentStatus};
pub use search::{
    CatalogFilters, CategoryFacet, PriceRange, ProductQuery, ProductSuggestion, SortBy,
    StockStatus,
};
pub use shipping::{Shipping, ShippingDetails, ShippingPatch, ShippingStatus, shipping_cost};
pub use user::{Role, User, UserSummary};
pub use value_objects::{MAX_PRICE, MAX_QUANTITY, Money};
