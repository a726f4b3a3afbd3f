//! Products and the category tree.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{CategoryId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{MAX_PRICE, MAX_QUANTITY, Money};

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub image_url: String,
    pub stock: u32,
    pub category_id: CategoryId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub image_url: String,
    pub stock: u32,
    pub category_id: CategoryId,
}

impl NewProduct {
    /// Validates the input and stamps identity and timestamps.
    pub fn into_product(self) -> Result<Product, DomainError> {
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(),
            name: self.name.trim().to_string(),
            description: self.description,
            price: self.price,
            image_url: self.image_url,
            stock: self.stock,
            category_id: self.category_id,
            created_at: now,
            updated_at: now,
        };
        validate_product(&product)?;
        Ok(product)
    }
}

/// Partial update of a product. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub image_url: Option<String>,
    pub stock: Option<u32>,
    pub category_id: Option<CategoryId>,
}

impl ProductPatch {
    pub fn apply(self, mut product: Product) -> Result<Product, DomainError> {
        if let Some(name) = self.name {
            product.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(image_url) = self.image_url {
            product.image_url = image_url;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category_id) = self.category_id {
            product.category_id = category_id;
        }
        product.updated_at = Utc::now();
        validate_product(&product)?;
        Ok(product)
    }
}

fn validate_product(product: &Product) -> Result<(), DomainError> {
    if product.name.is_empty() {
        return Err(DomainError::validation("product name is required"));
    }
    if !product.price.is_positive() {
        return Err(DomainError::validation("product price must be positive"));
    }
    if product.price > MAX_PRICE {
        return Err(DomainError::validation(format!(
            "product price must not exceed {MAX_PRICE}"
        )));
    }
    if product.stock > MAX_QUANTITY {
        return Err(DomainError::validation(format!(
            "stock must not exceed {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

/// A product category. Categories form a tree through `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(
        name: &str,
        description: Option<String>,
        parent_id: Option<CategoryId>,
    ) -> Result<Category, DomainError> {
        let name = validate_category_name(name)?;
        let now = Utc::now();
        Ok(Category {
            id: CategoryId::new(),
            name,
            description,
            parent_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Re-parents the category, refusing to make it its own parent.
    pub fn set_parent(&mut self, parent_id: Option<CategoryId>) -> Result<(), DomainError> {
        if parent_id == Some(self.id) {
            return Err(DomainError::validation(
                "a category cannot be its own parent",
            ));
        }
        self.parent_id = parent_id;
        Ok(())
    }

    pub fn rename(&mut self, name: &str) -> Result<(), DomainError> {
        self.name = validate_category_name(name)?;
        Ok(())
    }
}

fn validate_category_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("category name is required"));
    }
    Ok(name.to_string())
}

/// A category with its product count and nested sub-categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: u64,
    pub sub_categories: Vec<CategoryNode>,
}

/// Assembles flat `(category, product_count)` rows into a name-sorted forest.
///
/// Categories whose parent is missing from `rows` are treated as roots.
pub fn build_category_tree(rows: Vec<(Category, u64)>) -> Vec<CategoryNode> {
    let known: std::collections::HashSet<CategoryId> = rows.iter().map(|(c, _)| c.id).collect();
    let mut children: HashMap<Option<CategoryId>, Vec<(Category, u64)>> = HashMap::new();
    for (category, count) in rows {
        let parent = category.parent_id.filter(|p| known.contains(p));
        children.entry(parent).or_default().push((category, count));
    }

    fn attach(
        parent: Option<CategoryId>,
        children: &mut HashMap<Option<CategoryId>, Vec<(Category, u64)>>,
    ) -> Vec<CategoryNode> {
        let mut level = children.remove(&parent).unwrap_or_default();
        level.sort_by(|a, b| a.0.name.to_lowercase().cmp(&b.0.name.to_lowercase()));
        level
            .into_iter()
            .map(|(category, product_count)| {
                let sub_categories = attach(Some(category.id), children);
                CategoryNode {
                    category,
                    product_count,
                    sub_categories,
                }
            })
            .collect()
    }

    attach(None, &mut children)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product() -> NewProduct {
        NewProduct {
            name: "  Sisal basket ".to_string(),
            description: "Handwoven".to_string(),
            price: Money::from_units(1500),
            image_url: "https://img.example/basket.png".to_string(),
            stock: 4,
            category_id: CategoryId::new(),
        }
    }

    #[test]
    fn test_new_product_trims_name() {
        let product = new_product().into_product().unwrap();
        assert_eq!(product.name, "Sisal basket");
        assert!(product.in_stock());
    }

    #[test]
    fn test_new_product_rejects_invalid_fields() {
        let mut input = new_product();
        input.name = "   ".to_string();
        assert!(input.into_product().is_err());

        let mut input = new_product();
        input.price = Money::zero();
        assert!(input.into_product().is_err());

        let mut input = new_product();
        input.stock = MAX_QUANTITY + 1;
        assert!(input.into_product().is_err());

        let mut input = new_product();
        input.price = Money::from_cents(MAX_PRICE.cents() + 1);
        assert!(input.into_product().is_err());
    }

    #[test]
    fn test_patch_cannot_raise_price_past_limit() {
        let product = new_product().into_product().unwrap();
        let result = ProductPatch {
            price: Some(Money::from_cents(i64::MAX)),
            ..Default::default()
        }
        .apply(product);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_patch_updates_only_given_fields() {
        let product = new_product().into_product().unwrap();
        let patched = ProductPatch {
            stock: Some(0),
            ..Default::default()
        }
        .apply(product.clone())
        .unwrap();

        assert_eq!(patched.stock, 0);
        assert_eq!(patched.name, product.name);
        assert_eq!(patched.price, product.price);
        assert!(!patched.in_stock());
    }

    #[test]
    fn test_category_cannot_parent_itself() {
        let mut category = Category::new("Home", None, None).unwrap();
        let own_id = category.id;
        assert!(category.set_parent(Some(own_id)).is_err());
        assert!(category.set_parent(Some(CategoryId::new())).is_ok());
    }

    #[test]
    fn test_build_category_tree_nests_and_sorts() {
        let home = Category::new("home", None, None).unwrap();
        let art = Category::new("Art", None, None).unwrap();
        let kitchen = Category::new("Kitchen", None, Some(home.id)).unwrap();
        let decor = Category::new("Decor", None, Some(home.id)).unwrap();

        let tree = build_category_tree(vec![
            (kitchen.clone(), 3),
            (home.clone(), 1),
            (decor.clone(), 0),
            (art.clone(), 2),
        ]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].category.name, "Art");
        assert_eq!(tree[1].category.name, "home");
        let subs: Vec<_> = tree[1]
            .sub_categories
            .iter()
            .map(|n| n.category.name.as_str())
            .collect();
        assert_eq!(subs, vec!["Decor", "Kitchen"]);
        assert_eq!(tree[1].sub_categories[1].product_count, 3);
    }

    #[test]
    fn test_orphaned_category_becomes_root() {
        let orphan = Category::new("Orphan", None, Some(CategoryId::new())).unwrap();
        let tree = build_category_tree(vec![(orphan, 0)]);
        assert_eq!(tree.len(), 1);
    }
}
