//! Cart manager: per-user carts and checkout.

use std::time::Instant;

use common::{CartItemId, ProductId, UserId};
use domain::value_objects::validate_quantity;
use domain::{Cart, CartItem, CartView, Money, Order};
use store::Store;

use crate::error::{Result, ServiceError};
use crate::orders::OrderService;

/// Manages shopping carts. Stock is checked here but only decremented at checkout.
#[derive(Clone)]
pub struct CartService<S> {
    store: S,
    orders: OrderService<S>,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        let orders = OrderService::new(store.clone());
        Self { store, orders }
    }

    pub async fn get_or_create_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self.store.cart_for_user(user_id).await?)
    }

    /// The cart with current product details and total.
    pub async fn get_cart(&self, user_id: UserId) -> Result<CartView> {
        let cart = self.store.cart_for_user(user_id).await?;
        let lines = self.store.cart_lines(cart.id).await?;
        Ok(CartView::new(cart, lines))
    }

    /// Adds a product, summing with any existing line for it.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        validate_quantity(quantity)?;
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Product {product_id}")))?;
        if quantity > product.stock {
            return Err(ServiceError::InsufficientStock(product_id));
        }

        let cart = self.store.cart_for_user(user_id).await?;
        let item = self
            .store
            .add_cart_item(cart.id, product_id, quantity)
            .await?;
        tracing::debug!(cart_id = %cart.id, quantity = item.quantity, "cart line updated");
        Ok(item)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartItem> {
        validate_quantity(quantity)?;
        let cart = self.store.cart_for_user(user_id).await?;
        let item = self
            .store
            .get_cart_item(cart.id, item_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Cart item {item_id}")))?;

        let product = self
            .store
            .get_product(item.product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Product {}", item.product_id)))?;
        if quantity > product.stock {
            return Err(ServiceError::InsufficientStock(product.id));
        }

        self.store
            .set_cart_item_quantity(cart.id, item_id, quantity)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Cart item {item_id}")))
    }

    /// Removing a line that is not in the cart is a no-op.
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<()> {
        let cart = self.store.cart_for_user(user_id).await?;
        self.store.remove_cart_item(cart.id, item_id).await?;
        Ok(())
    }

    pub async fn clear(&self, user_id: UserId) -> Result<()> {
        self.store.clear_cart(user_id).await?;
        Ok(())
    }

    /// Sum of quantity times current price.
    pub async fn compute_total(&self, user_id: UserId) -> Result<Money> {
        Ok(self.get_cart(user_id).await?.total)
    }

    /// Turns the cart into an order. The cart is emptied in the same unit of
    /// work that decrements stock.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, user_id: UserId) -> Result<Order> {
        let start = Instant::now();
        let view = self.get_cart(user_id).await?;
        if view.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let items: Vec<(ProductId, u32)> = view
            .items
            .iter()
            .map(|line| (line.item.product_id, line.item.quantity))
            .collect();
        let order = self.orders.create_order(user_id, &items).await?;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_product, seed_user};
    use store::{CatalogStore, InMemoryStore};

    #[tokio::test]
    async fn test_add_item_sums_quantities() {
        let store = InMemoryStore::new();
        let user = seed_user(&store).await;
        let product = seed_product(&store, 10, 300).await;
        let service = CartService::new(store);

        service.add_item(user.id, product.id, 2).await.unwrap();
        let item = service.add_item(user.id, product.id, 3).await.unwrap();

        assert_eq!(item.quantity, 5);
        let view = service.get_cart(user.id).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.total.cents(), 1500);
    }

    #[tokio::test]
    async fn test_add_item_checks_stock_and_existence() {
        let store = InMemoryStore::new();
        let user = seed_user(&store).await;
        let product = seed_product(&store, 2, 300).await;
        let service = CartService::new(store);

        assert!(matches!(
            service.add_item(user.id, product.id, 3).await,
            Err(ServiceError::InsufficientStock(_))
        ));
        assert!(matches!(
            service.add_item(user.id, ProductId::new(), 1).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.add_item(user.id, product.id, 0).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_item_only_touches_own_cart() {
        let store = InMemoryStore::new();
        let owner = seed_user(&store).await;
        let other = seed_user(&store).await;
        let product = seed_product(&store, 10, 300).await;
        let service = CartService::new(store);

        let item = service.add_item(owner.id, product.id, 1).await.unwrap();

        let updated = service.update_item(owner.id, item.id, 4).await.unwrap();
        assert_eq!(updated.quantity, 4);

        assert!(matches!(
            service.update_item(other.id, item.id, 2).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.update_item(owner.id, item.id, 11).await,
            Err(ServiceError::InsufficientStock(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_and_clear_are_idempotent() {
        let store = InMemoryStore::new();
        let user = seed_user(&store).await;
        let product = seed_product(&store, 10, 300).await;
        let service = CartService::new(store);

        let item = service.add_item(user.id, product.id, 1).await.unwrap();
        service.remove_item(user.id, item.id).await.unwrap();
        service.remove_item(user.id, item.id).await.unwrap();
        service.clear(user.id).await.unwrap();

        assert_eq!(service.compute_total(user.id).await.unwrap(), Money::zero());
    }

    #[tokio::test]
    async fn test_checkout_places_order_and_empties_cart() {
        let store = InMemoryStore::new();
        let user = seed_user(&store).await;
        let product = seed_product(&store, 5, 999).await;
        let service = CartService::new(store.clone());

        service.add_item(user.id, product.id, 2).await.unwrap();
        let order = service.checkout(user.id).await.unwrap();

        assert_eq!(order.total.cents(), 1998);
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 3);
        assert!(service.get_cart(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_empty_cart() {
        let store = InMemoryStore::new();
        let user = seed_user(&store).await;
        let service = CartService::new(store);

        assert!(matches!(
            service.checkout(user.id).await,
            Err(ServiceError::EmptyCart)
        ));
    }
}
