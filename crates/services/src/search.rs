//! Product search, type-ahead suggestions and filter facets.

use std::collections::HashMap;

use common::{CategoryId, Page, PageRequest};
use domain::{
    CatalogFilters, CategoryFacet, Money, PriceRange, Product, ProductQuery, ProductSuggestion,
    SortBy, StockStatus,
};
use store::Store;

use crate::error::Result;

pub const DEFAULT_SUGGESTION_LIMIT: u32 = 5;
const MAX_SUGGESTION_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct SearchService<S> {
    store: S,
}

impl<S: Store> SearchService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn search(&self, query: ProductQuery) -> Result<Page<Product>> {
        let query = query.normalized()?;
        Ok(self.store.search_products(&query).await?)
    }

    /// Newest matching products first. An empty query yields no suggestions.
    #[tracing::instrument(skip(self))]
    pub async fn suggestions(&self, text: &str, limit: Option<u32>) -> Result<Vec<ProductSuggestion>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let limit = limit
            .unwrap_or(DEFAULT_SUGGESTION_LIMIT)
            .clamp(1, MAX_SUGGESTION_LIMIT);
        let query = ProductQuery {
            text: Some(text.to_string()),
            sort_by: SortBy::Newest,
            page: PageRequest::new(Some(1), Some(limit)),
            ..ProductQuery::default()
        };
        let products = self.store.search_products(&query).await?.items;
        let names = self.category_names().await?;

        Ok(products
            .into_iter()
            .map(|product| ProductSuggestion {
                id: product.id,
                category: names.get(&product.category_id).cloned().unwrap_or_default(),
                name: product.name,
                price: product.price,
                image_url: product.image_url,
            })
            .collect())
    }

    pub async fn filters(&self) -> Result<CatalogFilters> {
        let mut categories: Vec<CategoryFacet> = self
            .store
            .list_categories()
            .await?
            .into_iter()
            .map(|(category, _)| CategoryFacet {
                id: category.id,
                name: category.name,
            })
            .collect();
        categories.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        let stats = self.store.catalog_stats().await?;
        Ok(CatalogFilters {
            categories,
            price_range: PriceRange {
                min: stats.min_price.unwrap_or_else(Money::zero),
                max: stats.max_price.unwrap_or_else(Money::zero),
            },
            stock_status: StockStatus {
                in_stock: stats.in_stock,
                out_of_stock: stats.out_of_stock,
            },
        })
    }

    async fn category_names(&self) -> Result<HashMap<CategoryId, String>> {
        Ok(self
            .store
            .list_categories()
            .await?
            .into_iter()
            .map(|(category, _)| (category.id, category.name))
            .collect())
    }
}
