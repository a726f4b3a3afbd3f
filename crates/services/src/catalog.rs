//! Product and category management.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use common::{CategoryId, ProductId};
use domain::{
    Category, CategoryNode, NewProduct, Product, ProductPatch, build_category_tree,
};
use serde::{Deserialize, Serialize};
use store::{BulkCategoryDeletion, CategoryDeletion, Store, StoreError};

use crate::error::{Result, ServiceError};

/// Products of one category, as returned by the product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductGroup {
    pub category_id: CategoryId,
    pub category_name: String,
    pub products: Vec<Product>,
}

/// Input for creating a category.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
}

/// Partial update of a category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
}

#[derive(Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        self.require_category(input.category_id).await?;
        let product = input.into_product()?;
        self.store.insert_product(&product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Every product, grouped by category and ordered by category name.
    pub async fn list_products(&self) -> Result<Vec<ProductGroup>> {
        let names: HashMap<CategoryId, String> = self
            .store
            .list_categories()
            .await?
            .into_iter()
            .map(|(category, _)| (category.id, category.name))
            .collect();

        let mut groups: HashMap<CategoryId, Vec<Product>> = HashMap::new();
        for product in self.store.list_products().await? {
            groups.entry(product.category_id).or_default().push(product);
        }

        let mut groups: Vec<ProductGroup> = groups
            .into_iter()
            .map(|(category_id, products)| ProductGroup {
                category_id,
                category_name: names.get(&category_id).cloned().unwrap_or_default(),
                products,
            })
            .collect();
        groups.sort_by(|a, b| {
            a.category_name
                .to_lowercase()
                .cmp(&b.category_name.to_lowercase())
        });
        Ok(groups)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Product {id}")))
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product> {
        let product = self.get_product(id).await?;
        if let Some(category_id) = patch.category_id {
            self.require_category(category_id).await?;
        }

        let product = patch.apply(product)?;
        if !self.store.update_product(&product).await? {
            return Err(ServiceError::not_found(format!("Product {id}")));
        }
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        match self.store.delete_product(id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ServiceError::not_found(format!("Product {id}"))),
            Err(StoreError::Conflict(_)) => Err(ServiceError::HasDependents(
                "Cannot delete product referenced by existing orders".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(&self, input: NewCategory) -> Result<Category> {
        if self.store.find_category_by_name(input.name.trim()).await?.is_some() {
            return Err(ServiceError::AlreadyExists(
                "Category already exists".to_string(),
            ));
        }
        if let Some(parent_id) = input.parent_id {
            self.require_parent(parent_id).await?;
        }

        let category = Category::new(&input.name, input.description, input.parent_id)?;
        self.store.insert_category(&category).await?;
        tracing::info!(category_id = %category.id, "category created");
        Ok(category)
    }

    /// All categories as a tree, with direct product counts.
    pub async fn list_categories(&self) -> Result<Vec<CategoryNode>> {
        Ok(build_category_tree(self.store.list_categories().await?))
    }

    pub async fn get_category(&self, id: CategoryId) -> Result<Category> {
        self.store
            .get_category(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Category {id}")))
    }

    pub async fn category_products(&self, id: CategoryId) -> Result<Vec<Product>> {
        self.require_category(id).await?;
        Ok(self.store.products_in_category(id).await?)
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_category(&self, id: CategoryId, patch: CategoryPatch) -> Result<Category> {
        let mut category = self.get_category(id).await?;

        if let Some(name) = patch.name {
            if let Some(existing) = self.store.find_category_by_name(name.trim()).await?
                && existing.id != id
            {
                return Err(ServiceError::AlreadyExists(
                    "Category name already exists".to_string(),
                ));
            }
            category.rename(&name)?;
        }
        if let Some(description) = patch.description {
            category.description = Some(description);
        }
        if let Some(parent_id) = patch.parent_id {
            category.set_parent(Some(parent_id))?;
            self.require_parent(parent_id).await?;
            self.reject_cycle(id, parent_id).await?;
        }
        category.updated_at = Utc::now();

        if !self.store.update_category(&category).await? {
            return Err(ServiceError::not_found(format!("Category {id}")));
        }
        Ok(category)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<()> {
        match self.store.delete_category(id).await? {
            CategoryDeletion::Deleted => Ok(()),
            CategoryDeletion::NotFound => Err(ServiceError::not_found(format!("Category {id}"))),
            CategoryDeletion::HasProducts => Err(ServiceError::HasDependents(
                "Cannot delete category with existing products".to_string(),
            )),
            CategoryDeletion::HasSubCategories => Err(ServiceError::HasDependents(
                "Cannot delete category with existing sub-categories".to_string(),
            )),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_all_categories(&self) -> Result<u64> {
        match self.store.delete_all_categories().await? {
            BulkCategoryDeletion::Deleted(count) => Ok(count),
            BulkCategoryDeletion::BlockedByProducts => Err(ServiceError::HasDependents(
                "Cannot delete categories with existing products".to_string(),
            )),
        }
    }

    async fn require_category(&self, id: CategoryId) -> Result<Category> {
        self.get_category(id).await
    }

    async fn require_parent(&self, parent_id: CategoryId) -> Result<()> {
        self.store
            .get_category(parent_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found(format!("Parent category {parent_id}")))
    }

    /// Refuses to nest a category under one of its own descendants.
    async fn reject_cycle(&self, id: CategoryId, new_parent: CategoryId) -> Result<()> {
        let parents: HashMap<CategoryId, Option<CategoryId>> = self
            .store
            .list_categories()
            .await?
            .into_iter()
            .map(|(category, _)| (category.id, category.parent_id))
            .collect();

        let mut seen = HashSet::new();
        let mut cursor = Some(new_parent);
        while let Some(current) = cursor {
            if current == id {
                return Err(ServiceError::validation(
                    "a category cannot be nested under its own sub-category",
                ));
            }
            if !seen.insert(current) {
                break;
            }
            cursor = parents.get(&current).copied().flatten();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderService;
    use crate::test_support::{new_product, seed_user};
    use domain::Money;
    use store::InMemoryStore;

    fn category(name: &str, parent_id: Option<CategoryId>) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            description: None,
            parent_id,
        }
    }

    #[tokio::test]
    async fn test_create_product_requires_category() {
        let service = CatalogService::new(InMemoryStore::new());
        let result = service.create_product(new_product(CategoryId::new(), 3)).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_products_grouped_by_category() {
        let service = CatalogService::new(InMemoryStore::new());
        let textiles = service.create_category(category("Textiles", None)).await.unwrap();
        let art = service.create_category(category("Art", None)).await.unwrap();
        service.create_product(new_product(textiles.id, 1)).await.unwrap();
        service.create_product(new_product(textiles.id, 2)).await.unwrap();
        service.create_product(new_product(art.id, 3)).await.unwrap();

        let groups = service.list_products().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].category_name, "Art");
        assert_eq!(groups[1].products.len(), 2);
    }

    #[tokio::test]
    async fn test_update_product_validates_patch() {
        let service = CatalogService::new(InMemoryStore::new());
        let textiles = service.create_category(category("Textiles", None)).await.unwrap();
        let product = service.create_product(new_product(textiles.id, 1)).await.unwrap();

        let patch = ProductPatch {
            price: Some(Money::from_cents(4200)),
            ..ProductPatch::default()
        };
        let updated = service.update_product(product.id, patch).await.unwrap();
        assert_eq!(updated.price.cents(), 4200);

        let invalid = ProductPatch {
            price: Some(Money::zero()),
            ..ProductPatch::default()
        };
        assert!(matches!(
            service.update_product(product.id, invalid).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_ordered_product_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let service = CatalogService::new(store.clone());
        let user = seed_user(&store).await;
        let textiles = service.create_category(category("Textiles", None)).await.unwrap();
        let product = service.create_product(new_product(textiles.id, 5)).await.unwrap();
        OrderService::new(store)
            .create_order(user.id, &[(product.id, 1)])
            .await
            .unwrap();

        assert!(matches!(
            service.delete_product(product.id).await,
            Err(ServiceError::HasDependents(_))
        ));
    }

    #[tokio::test]
    async fn test_category_names_unique_ignoring_case() {
        let service = CatalogService::new(InMemoryStore::new());
        service.create_category(category("Crafts", None)).await.unwrap();

        let result = service.create_category(category("crafts", None)).await;
        assert!(matches!(result, Err(ServiceError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_delete_category_with_products_fails() {
        let service = CatalogService::new(InMemoryStore::new());
        let textiles = service.create_category(category("Textiles", None)).await.unwrap();
        service.create_product(new_product(textiles.id, 1)).await.unwrap();

        let err = service.delete_category(textiles.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete category with existing products");
        assert_eq!(service.category_products(textiles.id).await.unwrap().len(), 1);

        assert!(matches!(
            service.delete_all_categories().await,
            Err(ServiceError::HasDependents(_))
        ));
    }

    #[tokio::test]
    async fn test_category_tree_and_parent_rules() {
        let service = CatalogService::new(InMemoryStore::new());
        let home = service.create_category(category("Home", None)).await.unwrap();
        let kitchen = service
            .create_category(category("Kitchen", Some(home.id)))
            .await
            .unwrap();

        let tree = service.list_categories().await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].sub_categories[0].category.id, kitchen.id);

        let own_parent = CategoryPatch {
            parent_id: Some(home.id),
            ..CategoryPatch::default()
        };
        assert!(matches!(
            service.update_category(home.id, own_parent).await,
            Err(ServiceError::Validation(_))
        ));

        let under_child = CategoryPatch {
            parent_id: Some(kitchen.id),
            ..CategoryPatch::default()
        };
        assert!(matches!(
            service.update_category(home.id, under_child).await,
            Err(ServiceError::Validation(_))
        ));

        let err = service.delete_category(home.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete category with existing sub-categories");
    }

    #[tokio::test]
    async fn test_missing_parent_is_not_found() {
        let service = CatalogService::new(InMemoryStore::new());
        let result = service
            .create_category(category("Orphan", Some(CategoryId::new())))
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
