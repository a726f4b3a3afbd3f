use async_trait::async_trait;
use common::{
    CartId, CartItemId, CategoryId, OrderId, Page, PageRequest, PaymentId, ProductId, ShippingId,
    UserId,
};
use domain::{
    Cart, CartItem, CartLine, Category, Money, Order, OrderStatus, Payment, PaymentOutcome,
    Product, ProductQuery, Role, Shipping, ShippingDetails, ShippingStatus, User, UserSummary,
};

use crate::Result;

/// Aggregate figures used by the search facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CatalogStats {
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub in_stock: u64,
    pub out_of_stock: u64,
}

/// Outcome of a guarded category deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryDeletion {
    Deleted,
    NotFound,
    HasProducts,
    HasSubCategories,
}

/// Outcome of deleting every category at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkCategoryDeletion {
    Deleted(u64),
    BlockedByProducts,
}

/// Selects orders for listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            status: None,
        }
    }

    pub fn with_status(status: Option<OrderStatus>) -> Self {
        Self {
            user_id: None,
            status,
        }
    }
}

/// Products and categories.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// All products ordered by name.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Replaces a product's fields. Returns false if it does not exist.
    async fn update_product(&self, product: &Product) -> Result<bool>;

    /// Fails with `Conflict` while order lines still reference the product.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;

    async fn search_products(&self, query: &ProductQuery) -> Result<Page<Product>>;

    async fn catalog_stats(&self) -> Result<CatalogStats>;

    /// Fails with `Conflict` if the name is taken, ignoring case.
    async fn insert_category(&self, category: &Category) -> Result<()>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>>;

    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// Every category with the number of products directly in it.
    async fn list_categories(&self) -> Result<Vec<(Category, u64)>>;

    async fn update_category(&self, category: &Category) -> Result<bool>;

    /// Deletes a category only if it has neither products nor sub-categories.
    async fn delete_category(&self, id: CategoryId) -> Result<CategoryDeletion>;

    /// Deletes every category unless any product exists.
    async fn delete_all_categories(&self) -> Result<BulkCategoryDeletion>;

    async fn products_in_category(&self, id: CategoryId) -> Result<Vec<Product>>;
}

/// Carts and their lines.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the user's cart, creating it on first use.
    async fn cart_for_user(&self, user_id: UserId) -> Result<Cart>;

    /// Lines joined with current product details, oldest first.
    async fn cart_lines(&self, cart_id: CartId) -> Result<Vec<CartLine>>;

    async fn get_cart_item(&self, cart_id: CartId, item_id: CartItemId)
    -> Result<Option<CartItem>>;

    /// Inserts a line, or adds `quantity` to the existing line for the product.
    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem>;

    async fn set_cart_item_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Option<CartItem>>;

    async fn remove_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<bool>;

    /// Removes every line of the user's cart. Returns the number removed.
    async fn clear_cart(&self, user_id: UserId) -> Result<u64>;
}

/// Orders and their lines.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order as one unit of work: decrements stock for every
    /// line (failing with `InsufficientStock` or `ProductNotFound`), inserts
    /// the order and its lines, and clears the owner's cart.
    async fn place_order(&self, order: &Order) -> Result<()>;

    /// With `owner` set, only returns the order if it belongs to that user.
    async fn get_order(&self, id: OrderId, owner: Option<UserId>) -> Result<Option<Order>>;

    /// Matching orders, newest first.
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>>;

    async fn page_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>>;

    async fn count_orders(&self, user_id: Option<UserId>) -> Result<u64>;

    /// Cancels a pending order and restores its stock in one unit of work.
    /// Returns `None` if no pending order matches.
    async fn cancel_order(&self, id: OrderId, owner: Option<UserId>) -> Result<Option<Order>>;

    /// Moves an order from `from` to `to` if it is still in `from`.
    /// Moving to `Cancelled` restores stock in the same unit of work.
    async fn transition_order(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>>;

    /// Deletes an order with its lines, payments and shipping record.
    async fn delete_order(&self, id: OrderId) -> Result<bool>;

    async fn delete_all_orders(&self) -> Result<u64>;
}

/// Payment attempts.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>>;

    /// The most recent payment for an order.
    async fn latest_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// All payments, newest first.
    async fn list_payments(&self) -> Result<Vec<Payment>>;

    /// Records the provider outcome of a pending payment in one unit of work:
    /// the payment becomes completed or failed, an order still awaiting
    /// payment becomes paid or payment_failed, and on success the owner's
    /// cart is cleared. Returns `None` if the payment is no longer pending.
    async fn settle_payment(
        &self,
        id: PaymentId,
        outcome: PaymentOutcome,
    ) -> Result<Option<(Payment, Order)>>;

    /// Marks a completed payment refunded. Returns `None` unless it was completed.
    async fn refund_payment(&self, id: PaymentId, reason: &str) -> Result<Option<Payment>>;

    /// Sum of completed payments.
    async fn completed_revenue(&self) -> Result<Money>;
}

/// Shipping records.
#[async_trait]
pub trait ShippingStore: Send + Sync {
    /// Fails with `Conflict` if the order already has a shipping record.
    async fn insert_shipping(&self, shipping: &Shipping) -> Result<()>;

    async fn get_shipping(&self, id: ShippingId) -> Result<Option<Shipping>>;

    async fn shipping_for_order(&self, order_id: OrderId) -> Result<Option<Shipping>>;

    /// Records with the given status, or all records, newest first.
    async fn list_shipping(&self, status: Option<ShippingStatus>) -> Result<Vec<Shipping>>;

    /// Replaces the destination details while the record is still pending.
    async fn update_shipping_details(
        &self,
        id: ShippingId,
        details: &ShippingDetails,
    ) -> Result<Option<Shipping>>;

    /// Moves a record from `from` to `to` if it is still in `from`.
    async fn advance_shipping(
        &self,
        id: ShippingId,
        from: ShippingStatus,
        to: ShippingStatus,
        tracking_number: Option<&str>,
    ) -> Result<Option<Shipping>>;

    /// Deletes a record while it is still pending.
    async fn delete_shipping(&self, id: ShippingId) -> Result<bool>;
}

/// User accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` if the email is taken.
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_reset_token(&self, digest: &str) -> Result<Option<User>>;

    /// Users with their order counts, newest first.
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserSummary>>;

    async fn update_user(&self, user: &User) -> Result<bool>;

    /// Fails with `Conflict` while the user still has orders.
    async fn delete_user(&self, id: UserId) -> Result<bool>;

    async fn count_users(&self) -> Result<u64>;
}

/// Every persistence concern behind one cloneable handle.
pub trait Store:
    CatalogStore + CartStore + OrderStore + PaymentStore + ShippingStore + UserStore + Clone + 'static
{
}

impl<T> Store for T where
    T: CatalogStore
        + CartStore
        + OrderStore
        + PaymentStore
        + ShippingStore
        + UserStore
        + Clone
        + 'static
{
}
