//! Shopping carts.

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::value_objects::Money;

/// A user's cart. Each user has at most one, created on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::new(),
            user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One line of a cart. A product appears at most once per cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A cart line joined with the product's current details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: Product,
}

impl CartLine {
    /// Line total at the product's current price.
    pub fn subtotal(&self) -> Money {
        self.product.price.multiply(self.item.quantity)
    }
}

/// A cart with its lines and the current total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub items: Vec<CartLine>,
    pub total: Money,
}

impl CartView {
    pub fn new(cart: Cart, items: Vec<CartLine>) -> Self {
        let total = items.iter().map(CartLine::subtotal).sum();
        Self { cart, items, total }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CategoryId;

    fn line(cart: &Cart, price_cents: i64, quantity: u32) -> CartLine {
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(),
            name: "Tea".to_string(),
            description: "Kericho tea".to_string(),
            price: Money::from_cents(price_cents),
            image_url: String::new(),
            stock: 10,
            category_id: CategoryId::new(),
            created_at: now,
            updated_at: now,
        };
        CartLine {
            item: CartItem {
                id: CartItemId::new(),
                cart_id: cart.id,
                product_id: product.id,
                quantity,
            },
            product,
        }
    }

    #[test]
    fn test_total_uses_current_prices() {
        let cart = Cart::new(UserId::new());
        let view = CartView::new(cart.clone(), vec![line(&cart, 1000, 2), line(&cart, 150, 1)]);
        assert_eq!(view.total, Money::from_cents(2150));
        assert!(!view.is_empty());
    }

    #[test]
    fn test_empty_cart_total_is_zero() {
        let view = CartView::new(Cart::new(UserId::new()), vec![]);
        assert!(view.total.is_zero());
        assert!(view.is_empty());
    }
}
