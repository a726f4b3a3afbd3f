//! Fixtures shared by the unit tests.

use common::CategoryId;
use domain::{Category, Money, NewProduct, Product, Role, ShippingDetails, User};
use store::{CatalogStore, InMemoryStore, UserStore};
use uuid::Uuid;

/// A customer with a unique email and an unusable password hash.
pub async fn seed_user(store: &InMemoryStore) -> User {
    let user = User::new(
        "Test Customer",
        &format!("customer-{}@example.com", Uuid::new_v4()),
        "not-a-hash".to_string(),
        Role::Customer,
    );
    store.insert_user(&user).await.unwrap();
    user
}

pub fn new_product(category_id: CategoryId, stock: u32) -> NewProduct {
    NewProduct {
        name: "Kikoy beach towel".to_string(),
        description: "Handwoven cotton".to_string(),
        price: Money::from_cents(1500),
        image_url: String::new(),
        stock,
        category_id,
    }
}

/// A product in a fresh category of its own.
pub async fn seed_product(store: &InMemoryStore, stock: u32, price_cents: i64) -> Product {
    let category = Category::new(&format!("Category {}", Uuid::new_v4()), None, None).unwrap();
    store.insert_category(&category).await.unwrap();

    let mut input = new_product(category.id, stock);
    input.price = Money::from_cents(price_cents);
    let product = input.into_product().unwrap();
    store.insert_product(&product).await.unwrap();
    product
}

pub fn shipping_details() -> ShippingDetails {
    ShippingDetails {
        address: "12 Moi Avenue".to_string(),
        city: "Nairobi".to_string(),
        postal_code: "00100".to_string(),
        phone: "0712345678".to_string(),
        estimated_delivery: None,
    }
}
