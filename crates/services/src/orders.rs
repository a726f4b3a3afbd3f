//! Order workflow: placement, cancellation and administrative status changes.

use common::{OrderId, Page, PageRequest, ProductId, UserId};
use domain::value_objects::validate_quantity;
use domain::{Order, OrderStatus};
use store::{OrderFilter, Store};

use crate::actor::Actor;
use crate::error::{Result, ServiceError};

/// Places orders and moves them through their status machine.
#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates an order from `(product, quantity)` lines.
    ///
    /// Stock is checked against current product data first so callers get a
    /// precise error. The stock decrement, order insertion and cart clearing
    /// then happen in a single unit of work, which re-checks stock atomically.
    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn create_order(&self, user_id: UserId, items: &[(ProductId, u32)]) -> Result<Order> {
        if items.is_empty() {
            return Err(ServiceError::validation(
                "order must contain at least one item",
            ));
        }

        let mut lines = Vec::with_capacity(items.len());
        for &(product_id, quantity) in items {
            validate_quantity(quantity)?;
            let product = self
                .store
                .get_product(product_id)
                .await?
                .ok_or_else(|| ServiceError::not_found(format!("Product {product_id}")))?;
            if quantity > product.stock {
                return Err(ServiceError::InsufficientStock(product_id));
            }
            lines.push((product, quantity));
        }

        let order = Order::place(user_id, &lines)?;
        self.store.place_order(&order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total, "order placed");
        Ok(order)
    }

    /// Cancels a pending order on behalf of its owner and restores stock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, actor: Actor) -> Result<Order> {
        let owner = actor.owner_filter();
        if let Some(order) = self.store.cancel_order(order_id, owner).await? {
            metrics::counter!("orders_cancelled_total").increment(1);
            tracing::info!(order_id = %order.id, "order cancelled");
            return Ok(order);
        }

        match self.store.get_order(order_id, owner).await? {
            Some(order) => Err(ServiceError::NotCancellable(format!(
                "order is {}",
                order.status
            ))),
            None => Err(ServiceError::not_found(format!("Order {order_id}"))),
        }
    }

    /// Administrative status change. Moving to `cancelled` restores stock.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id, None)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Order {order_id}")))?;

        order.status.check_transition(status)?;

        let updated = self
            .store
            .transition_order(order_id, order.status, status)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidState(format!(
                    "order {order_id} changed status concurrently"
                ))
            })?;

        if status == OrderStatus::Cancelled {
            metrics::counter!("orders_cancelled_total").increment(1);
        }
        tracing::info!(order_id = %order_id, from = %order.status, to = %status, "order status updated");
        Ok(updated)
    }

    /// With an owner, only that user's order is visible.
    pub async fn get_order(&self, order_id: OrderId, owner: Option<UserId>) -> Result<Order> {
        self.store
            .get_order(order_id, owner)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Order {order_id}")))
    }

    pub async fn list_all_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(OrderFilter::default()).await?)
    }

    pub async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(OrderFilter::for_user(user_id)).await?)
    }

    pub async fn list_orders_page(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        Ok(self
            .store
            .page_orders(OrderFilter::with_status(status), page)
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, order_id: OrderId) -> Result<()> {
        if !self.store.delete_order(order_id).await? {
            return Err(ServiceError::not_found(format!("Order {order_id}")));
        }
        tracing::info!(order_id = %order_id, "order deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_all_orders(&self) -> Result<u64> {
        let deleted = self.store.delete_all_orders().await?;
        tracing::warn!(deleted, "all orders deleted");
        Ok(deleted)
    }
}
