use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartId, CartItemId, CategoryId, OrderId, Page, PageRequest, PaymentId, ProductId, ShippingId,
    UserId,
};
use domain::{
    Cart, CartItem, CartLine, Category, Money, Order, OrderStatus, Payment, PaymentOutcome,
    PaymentStatus, Product, ProductQuery, Role, Shipping, ShippingDetails, ShippingStatus,
    SortBy, User, UserSummary,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{
        BulkCategoryDeletion, CartStore, CatalogStats, CatalogStore, CategoryDeletion,
        OrderFilter, OrderStore, PaymentStore, ShippingStore, UserStore,
    },
};

#[derive(Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    categories: HashMap<CategoryId, Category>,
    carts: HashMap<CartId, Cart>,
    /// Kept in insertion order so cart lines list oldest first.
    cart_items: Vec<CartItem>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    shipping: HashMap<ShippingId, Shipping>,
    users: HashMap<UserId, User>,
}

impl Tables {
    fn clear_cart_of(&mut self, user_id: UserId) -> u64 {
        let carts: HashSet<CartId> = self
            .carts
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.id)
            .collect();
        let before = self.cart_items.len();
        self.cart_items.retain(|item| !carts.contains(&item.cart_id));
        (before - self.cart_items.len()) as u64
    }

    fn restore_stock(&mut self, order: &Order, now: DateTime<Utc>) {
        for item in &order.items {
            if let Some(product) = self.products.get_mut(&item.product_id) {
                product.stock += item.quantity;
                product.updated_at = now;
            }
        }
    }

    fn orders_matching(&self, filter: OrderFilter) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| filter.user_id.is_none_or(|u| o.user_id == u))
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        orders
    }

    fn order_count(&self, user_id: UserId) -> u64 {
        self.orders.values().filter(|o| o.user_id == user_id).count() as u64
    }

    fn category_name_taken(&self, name: &str, except: Option<CategoryId>) -> bool {
        let name = name.to_lowercase();
        self.categories
            .values()
            .any(|c| Some(c.id) != except && c.name.to_lowercase() == name)
    }

    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email == email)
    }
}

/// In-memory store implementation for tests and database-less runs.
///
/// Every trait method takes the single table lock once, so multi-row
/// changes are observed atomically just like a database transaction.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the total number of stored payments.
    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.categories.contains_key(&product.category_id) {
            return Err(StoreError::Conflict(format!(
                "category {} does not exist",
                product.category_id
            )));
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let t = self.tables.read().await;
        let mut products: Vec<Product> = t.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn update_product(&self, product: &Product) -> Result<bool> {
        let mut t = self.tables.write().await;
        if !t.categories.contains_key(&product.category_id) {
            return Err(StoreError::Conflict(format!(
                "category {} does not exist",
                product.category_id
            )));
        }
        match t.products.get_mut(&product.id) {
            Some(existing) => {
                *existing = product.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let mut t = self.tables.write().await;
        let referenced = t
            .orders
            .values()
            .any(|o| o.items.iter().any(|i| i.product_id == id));
        if referenced {
            return Err(StoreError::Conflict(
                "product is referenced by existing orders".to_string(),
            ));
        }
        let removed = t.products.remove(&id).is_some();
        t.cart_items.retain(|item| item.product_id != id);
        Ok(removed)
    }

    async fn search_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let t = self.tables.read().await;

        let category_ids: Option<HashSet<CategoryId>> = query.category.as_ref().map(|name| {
            let name = name.to_lowercase();
            t.categories
                .values()
                .filter(|c| c.name.to_lowercase() == name)
                .map(|c| c.id)
                .collect()
        });
        let text = query.text.as_ref().map(|s| s.to_lowercase());

        let mut matches: Vec<&Product> = t
            .products
            .values()
            .filter(|p| {
                text.as_ref().is_none_or(|q| {
                    p.name.to_lowercase().contains(q) || p.description.to_lowercase().contains(q)
                })
            })
            .filter(|p| {
                category_ids
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&p.category_id))
            })
            .filter(|p| query.min_price.is_none_or(|min| p.price >= min))
            .filter(|p| query.max_price.is_none_or(|max| p.price <= max))
            .filter(|p| query.in_stock.is_none_or(|wanted| p.in_stock() == wanted))
            .collect();

        match query.sort_by {
            SortBy::Newest => {
                matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            }
            SortBy::PriceAsc => matches.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id))),
            SortBy::PriceDesc => {
                matches.sort_by(|a, b| b.price.cmp(&a.price).then(a.id.cmp(&b.id)));
            }
            SortBy::BestSelling => {
                let mut sales: HashMap<ProductId, u64> = HashMap::new();
                for item in t.orders.values().flat_map(|o| o.items.iter()) {
                    *sales.entry(item.product_id).or_default() += 1;
                }
                let sold = |p: &Product| sales.get(&p.id).copied().unwrap_or(0);
                matches.sort_by(|a, b| sold(b).cmp(&sold(a)).then(a.id.cmp(&b.id)));
            }
        }

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(query.page.offset() as usize)
            .take(query.page.limit as usize)
            .cloned()
            .collect();
        Ok(Page::new(items, total, query.page))
    }

    async fn catalog_stats(&self) -> Result<CatalogStats> {
        let t = self.tables.read().await;
        let in_stock = t.products.values().filter(|p| p.in_stock()).count() as u64;
        Ok(CatalogStats {
            min_price: t.products.values().map(|p| p.price).min(),
            max_price: t.products.values().map(|p| p.price).max(),
            in_stock,
            out_of_stock: t.products.len() as u64 - in_stock,
        })
    }

    async fn insert_category(&self, category: &Category) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.category_name_taken(&category.name, None) {
            return Err(StoreError::Conflict(format!(
                "category name '{}' is taken",
                category.name
            )));
        }
        t.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let name = name.to_lowercase();
        Ok(self
            .tables
            .read()
            .await
            .categories
            .values()
            .find(|c| c.name.to_lowercase() == name)
            .cloned())
    }

    async fn list_categories(&self) -> Result<Vec<(Category, u64)>> {
        let t = self.tables.read().await;
        let mut counts: HashMap<CategoryId, u64> = HashMap::new();
        for product in t.products.values() {
            *counts.entry(product.category_id).or_default() += 1;
        }
        let mut rows: Vec<(Category, u64)> = t
            .categories
            .values()
            .map(|c| (c.clone(), counts.get(&c.id).copied().unwrap_or(0)))
            .collect();
        rows.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        Ok(rows)
    }

    async fn update_category(&self, category: &Category) -> Result<bool> {
        let mut t = self.tables.write().await;
        if t.category_name_taken(&category.name, Some(category.id)) {
            return Err(StoreError::Conflict(format!(
                "category name '{}' is taken",
                category.name
            )));
        }
        match t.categories.get_mut(&category.id) {
            Some(existing) => {
                *existing = category.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_category(&self, id: CategoryId) -> Result<CategoryDeletion> {
        let mut t = self.tables.write().await;
        if !t.categories.contains_key(&id) {
            return Ok(CategoryDeletion::NotFound);
        }
        if t.products.values().any(|p| p.category_id == id) {
            return Ok(CategoryDeletion::HasProducts);
        }
        if t.categories.values().any(|c| c.parent_id == Some(id)) {
            return Ok(CategoryDeletion::HasSubCategories);
        }
        t.categories.remove(&id);
        Ok(CategoryDeletion::Deleted)
    }

    async fn delete_all_categories(&self) -> Result<BulkCategoryDeletion> {
        let mut t = self.tables.write().await;
        if !t.products.is_empty() {
            return Ok(BulkCategoryDeletion::BlockedByProducts);
        }
        let count = t.categories.len() as u64;
        t.categories.clear();
        Ok(BulkCategoryDeletion::Deleted(count))
    }

    async fn products_in_category(&self, id: CategoryId) -> Result<Vec<Product>> {
        let t = self.tables.read().await;
        let mut products: Vec<Product> = t
            .products
            .values()
            .filter(|p| p.category_id == id)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn cart_for_user(&self, user_id: UserId) -> Result<Cart> {
        let mut t = self.tables.write().await;
        if let Some(cart) = t.carts.values().find(|c| c.user_id == user_id) {
            return Ok(cart.clone());
        }
        let cart = Cart::new(user_id);
        t.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn cart_lines(&self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let t = self.tables.read().await;
        Ok(t.cart_items
            .iter()
            .filter(|item| item.cart_id == cart_id)
            .filter_map(|item| {
                t.products.get(&item.product_id).map(|product| CartLine {
                    item: item.clone(),
                    product: product.clone(),
                })
            })
            .collect())
    }

    async fn get_cart_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>> {
        Ok(self
            .tables
            .read()
            .await
            .cart_items
            .iter()
            .find(|item| item.cart_id == cart_id && item.id == item_id)
            .cloned())
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let mut t = self.tables.write().await;
        if !t.products.contains_key(&product_id) {
            return Err(StoreError::ProductNotFound(product_id));
        }
        if let Some(existing) = t
            .cart_items
            .iter_mut()
            .find(|item| item.cart_id == cart_id && item.product_id == product_id)
        {
            existing.quantity += quantity;
            return Ok(existing.clone());
        }
        let item = CartItem {
            id: CartItemId::new(),
            cart_id,
            product_id,
            quantity,
        };
        t.cart_items.push(item.clone());
        Ok(item)
    }

    async fn set_cart_item_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Option<CartItem>> {
        let mut t = self.tables.write().await;
        Ok(t.cart_items
            .iter_mut()
            .find(|item| item.cart_id == cart_id && item.id == item_id)
            .map(|item| {
                item.quantity = quantity;
                item.clone()
            }))
    }

    async fn remove_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.cart_items.len();
        t.cart_items
            .retain(|item| !(item.cart_id == cart_id && item.id == item_id));
        Ok(t.cart_items.len() < before)
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<u64> {
        Ok(self.tables.write().await.clear_cart_of(user_id))
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place_order(&self, order: &Order) -> Result<()> {
        let mut t = self.tables.write().await;

        // Check every line before touching anything so a failure leaves no trace.
        for item in &order.items {
            let product = t
                .products
                .get(&item.product_id)
                .ok_or(StoreError::ProductNotFound(item.product_id))?;
            if product.stock < item.quantity {
                return Err(StoreError::InsufficientStock(item.product_id));
            }
        }

        let now = Utc::now();
        for item in &order.items {
            if let Some(product) = t.products.get_mut(&item.product_id) {
                product.stock -= item.quantity;
                product.updated_at = now;
            }
        }
        t.orders.insert(order.id, order.clone());
        t.clear_cart_of(order.user_id);
        Ok(())
    }

    async fn get_order(&self, id: OrderId, owner: Option<UserId>) -> Result<Option<Order>> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .get(&id)
            .filter(|o| owner.is_none_or(|u| o.user_id == u))
            .cloned())
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        Ok(self.tables.read().await.orders_matching(filter))
    }

    async fn page_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let orders = self.tables.read().await.orders_matching(filter);
        let total = orders.len() as u64;
        let items = orders
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok(Page::new(items, total, page))
    }

    async fn count_orders(&self, user_id: Option<UserId>) -> Result<u64> {
        let t = self.tables.read().await;
        Ok(match user_id {
            Some(user_id) => t.order_count(user_id),
            None => t.orders.len() as u64,
        })
    }

    async fn cancel_order(&self, id: OrderId, owner: Option<UserId>) -> Result<Option<Order>> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let Some(order) = t
            .orders
            .get_mut(&id)
            .filter(|o| owner.is_none_or(|u| o.user_id == u))
            .filter(|o| o.status.can_cancel())
        else {
            return Ok(None);
        };
        order.status = OrderStatus::Cancelled;
        order.updated_at = now;
        let order = order.clone();
        t.restore_stock(&order, now);
        Ok(Some(order))
    }

    async fn transition_order(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let Some(order) = t.orders.get_mut(&id).filter(|o| o.status == from) else {
            return Ok(None);
        };
        order.status = to;
        order.updated_at = now;
        let order = order.clone();
        if to == OrderStatus::Cancelled {
            t.restore_stock(&order, now);
        }
        Ok(Some(order))
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let mut t = self.tables.write().await;
        let removed = t.orders.remove(&id).is_some();
        t.payments.retain(|_, p| p.order_id != id);
        t.shipping.retain(|_, s| s.order_id != id);
        Ok(removed)
    }

    async fn delete_all_orders(&self) -> Result<u64> {
        let mut t = self.tables.write().await;
        let count = t.orders.len() as u64;
        t.orders.clear();
        t.payments.clear();
        t.shipping.clear();
        Ok(count)
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.orders.contains_key(&payment.order_id) {
            return Err(StoreError::Conflict(format!(
                "order {} does not exist",
                payment.order_id
            )));
        }
        if let Some(reference) = &payment.transaction_id
            && t
                .payments
                .values()
                .any(|p| p.transaction_id.as_ref() == Some(reference))
        {
            return Err(StoreError::Conflict(format!(
                "transaction {reference} is already recorded"
            )));
        }
        t.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.tables.read().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .tables
            .read()
            .await
            .payments
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn latest_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self
            .tables
            .read()
            .await
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn list_payments(&self) -> Result<Vec<Payment>> {
        let t = self.tables.read().await;
        let mut payments: Vec<Payment> = t.payments.values().cloned().collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn settle_payment(
        &self,
        id: PaymentId,
        outcome: PaymentOutcome,
    ) -> Result<Option<(Payment, Order)>> {
        let mut t = self.tables.write().await;
        let now = Utc::now();

        let Some(payment) = t.payments.get_mut(&id).filter(|p| p.status.is_pending()) else {
            return Ok(None);
        };
        payment.status = outcome.payment_status();
        payment.updated_at = now;
        let payment = payment.clone();

        let order = t
            .orders
            .get_mut(&payment.order_id)
            .ok_or_else(|| StoreError::Corrupt(format!("payment {id} has no order")))?;
        if order.status.awaits_payment() {
            order.status = match outcome {
                PaymentOutcome::Completed => OrderStatus::Paid,
                PaymentOutcome::Failed => OrderStatus::PaymentFailed,
            };
            order.updated_at = now;
        }
        let order = order.clone();

        if outcome == PaymentOutcome::Completed {
            t.clear_cart_of(order.user_id);
        }
        Ok(Some((payment, order)))
    }

    async fn refund_payment(&self, id: PaymentId, reason: &str) -> Result<Option<Payment>> {
        let mut t = self.tables.write().await;
        Ok(t.payments
            .get_mut(&id)
            .filter(|p| p.status.can_refund())
            .map(|payment| {
                payment.status = PaymentStatus::Refunded;
                payment.refund_reason = Some(reason.to_string());
                payment.updated_at = Utc::now();
                payment.clone()
            }))
    }

    async fn completed_revenue(&self) -> Result<Money> {
        Ok(self
            .tables
            .read()
            .await
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Completed)
            .map(|p| p.amount)
            .sum())
    }
}

#[async_trait]
impl ShippingStore for InMemoryStore {
    async fn insert_shipping(&self, shipping: &Shipping) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.shipping.values().any(|s| s.order_id == shipping.order_id) {
            return Err(StoreError::Conflict(format!(
                "order {} already has a shipping record",
                shipping.order_id
            )));
        }
        t.shipping.insert(shipping.id, shipping.clone());
        Ok(())
    }

    async fn get_shipping(&self, id: ShippingId) -> Result<Option<Shipping>> {
        Ok(self.tables.read().await.shipping.get(&id).cloned())
    }

    async fn shipping_for_order(&self, order_id: OrderId) -> Result<Option<Shipping>> {
        Ok(self
            .tables
            .read()
            .await
            .shipping
            .values()
            .find(|s| s.order_id == order_id)
            .cloned())
    }

    async fn list_shipping(&self, status: Option<ShippingStatus>) -> Result<Vec<Shipping>> {
        let t = self.tables.read().await;
        let mut records: Vec<Shipping> = t
            .shipping
            .values()
            .filter(|s| status.is_none_or(|status| s.status == status))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn update_shipping_details(
        &self,
        id: ShippingId,
        details: &ShippingDetails,
    ) -> Result<Option<Shipping>> {
        let mut t = self.tables.write().await;
        Ok(t.shipping
            .get_mut(&id)
            .filter(|s| s.status.is_editable())
            .map(|shipping| {
                shipping.details = details.clone();
                shipping.updated_at = Utc::now();
                shipping.clone()
            }))
    }

    async fn advance_shipping(
        &self,
        id: ShippingId,
        from: ShippingStatus,
        to: ShippingStatus,
        tracking_number: Option<&str>,
    ) -> Result<Option<Shipping>> {
        let mut t = self.tables.write().await;
        Ok(t.shipping
            .get_mut(&id)
            .filter(|s| s.status == from)
            .map(|shipping| {
                shipping.status = to;
                if let Some(tracking_number) = tracking_number {
                    shipping.tracking_number = Some(tracking_number.to_string());
                }
                shipping.updated_at = Utc::now();
                shipping.clone()
            }))
    }

    async fn delete_shipping(&self, id: ShippingId) -> Result<bool> {
        let mut t = self.tables.write().await;
        let editable = t
            .shipping
            .get(&id)
            .is_some_and(|s| s.status.is_editable());
        if editable {
            t.shipping.remove(&id);
        }
        Ok(editable)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.email_taken(&user.email, None) {
            return Err(StoreError::Conflict(format!(
                "email {} is already registered",
                user.email
            )));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_reset_token(&self, digest: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.reset_token.as_deref() == Some(digest))
            .cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserSummary>> {
        let t = self.tables.read().await;
        let mut users: Vec<UserSummary> = t
            .users
            .values()
            .filter(|u| role.is_none_or(|r| u.role == r))
            .map(|u| UserSummary {
                user: u.clone(),
                order_count: t.order_count(u.id),
            })
            .collect();
        users.sort_by(|a, b| b.user.created_at.cmp(&a.user.created_at));
        Ok(users)
    }

    async fn update_user(&self, user: &User) -> Result<bool> {
        let mut t = self.tables.write().await;
        if t.email_taken(&user.email, Some(user.id)) {
            return Err(StoreError::Conflict(format!(
                "email {} is already registered",
                user.email
            )));
        }
        match t.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let mut t = self.tables.write().await;
        if t.order_count(id) > 0 {
            return Err(StoreError::Conflict("user still has orders".to_string()));
        }
        t.clear_cart_of(id);
        t.carts.retain(|_, c| c.user_id != id);
        Ok(t.users.remove(&id).is_some())
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.tables.read().await.users.len() as u64)
    }
}
