//! Placed orders and their lines.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::catalog::Product;
use crate::error::DomainError;
use crate::value_objects::{Money, validate_quantity};

/// One line of an order with the unit price frozen at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl OrderItem {
    /// Returns the total price for this line (quantity * price).
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Money,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a pending order from `(product, quantity)` lines, snapshotting
    /// each product's current price.
    ///
    /// Stock is not checked here; the store re-checks it while decrementing.
    pub fn place(user_id: UserId, lines: &[(Product, u32)]) -> Result<Order, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one item"));
        }

        let id = OrderId::new();
        let mut items = Vec::with_capacity(lines.len());
        for (product, quantity) in lines {
            validate_quantity(*quantity)?;
            if items
                .iter()
                .any(|item: &OrderItem| item.product_id == product.id)
            {
                return Err(DomainError::validation(format!(
                    "product {} appears more than once",
                    product.id
                )));
            }
            items.push(OrderItem {
                id: OrderItemId::new(),
                order_id: id,
                product_id: product.id,
                quantity: *quantity,
                price: product.price,
            });
        }

        let total = items
            .iter()
            .try_fold(Money::zero(), |total, item| {
                item.price
                    .checked_multiply(item.quantity)
                    .and_then(|line| total.checked_add(line))
            })
            .ok_or_else(|| DomainError::validation("order total is too large"))?;

        let now = Utc::now();
        Ok(Order {
            id,
            user_id,
            status: OrderStatus::Pending,
            total,
            items,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn belongs_to(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use common::CategoryId;

    fn product(price_cents: i64, stock: u32) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(),
            name: "Kikoy".to_string(),
            description: "Cotton wrap".to_string(),
            price: Money::from_cents(price_cents),
            image_url: "https://img.example/kikoy.png".to_string(),
            stock,
            category_id: CategoryId::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_place_snapshots_prices_and_totals() {
        let a = product(1000, 5);
        let b = product(250, 5);
        let user = UserId::new();

        let order = Order::place(user, &[(a.clone(), 2), (b.clone(), 3)]).unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Money::from_cents(2750));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].price, a.price);
        assert!(order.items.iter().all(|i| i.order_id == order.id));
        assert!(order.belongs_to(user));
    }

    #[test]
    fn test_place_rejects_empty_and_zero_quantity() {
        let user = UserId::new();
        assert!(Order::place(user, &[]).is_err());
        assert!(Order::place(user, &[(product(100, 1), 0)]).is_err());
    }

    #[test]
    fn test_place_rejects_overflowing_total() {
        let pricey = product(i64::MAX / 2 + 1, 5);
        let result = Order::place(UserId::new(), &[(pricey, 2)]);
        assert!(matches!(result, Err(DomainError::Validation(_))));

        let a = product(i64::MAX / 2, 1);
        let b = product(i64::MAX / 2, 1);
        let result = Order::place(UserId::new(), &[(a, 1), (b, 2)]);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_place_rejects_duplicate_products() {
        let p = product(100, 10);
        let result = Order::place(UserId::new(), &[(p.clone(), 1), (p, 2)]);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }
}
