use common::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A stock decrement found fewer units than requested.
    /// The enclosing unit of work has been rolled back.
    #[error("Insufficient stock for product {0}")]
    InsufficientStock(ProductId),

    /// A product referenced by a unit of work no longer exists.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A uniqueness or referential constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
