//! Persistence for the storefront backend.
//!
//! The `Store` traits expose every multi-row change as a single method so
//! that callers never hold a transaction open across service logic.
//! `PostgresStore` runs each such method in one database transaction;
//! `InMemoryStore` runs it under one write lock.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::{PostgresStore, create_pool};
pub use store::{
    BulkCategoryDeletion, CartStore, CatalogStats, CatalogStore, CategoryDeletion, OrderFilter,
    OrderStore, PaymentStore, ShippingStore, Store, UserStore,
};
