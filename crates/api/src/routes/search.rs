//! Public product search.
//!
//! Query parameters are camelCase. Prices are in cents, like every amount
//! the API returns.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use common::{Page, PageRequest};
use domain::{CatalogFilters, Money, Product, ProductQuery, ProductSuggestion, SortBy};
use serde::Deserialize;
use services::ServiceError;
use store::Store;

use super::QueryParams;
use crate::AppState;
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/search", get(search::<S>))
        .route("/search/suggestions", get(suggestions::<S>))
        .route("/search/filters", get(filters::<S>))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub in_stock: Option<bool>,
    pub sort_by: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl SearchParams {
    fn into_query(self) -> Result<ProductQuery, ServiceError> {
        let sort_by = match self.sort_by.as_deref().map(str::trim) {
            None | Some("") => SortBy::default(),
            Some(value) => value.parse()?,
        };
        Ok(ProductQuery {
            text: self.q,
            category: self.category,
            min_price: self.min_price.map(Money::from_cents),
            max_price: self.max_price.map(Money::from_cents),
            in_stock: self.in_stock,
            sort_by,
            page: PageRequest::new(self.page, self.limit),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

/// GET /search
pub async fn search<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    QueryParams(params): QueryParams<SearchParams>,
) -> Result<Json<Page<Product>>, ApiError> {
    let query = params.into_query()?;
    Ok(Json(state.search.search(query).await?))
}

/// GET /search/suggestions
pub async fn suggestions<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    QueryParams(params): QueryParams<SuggestionParams>,
) -> Result<Json<Vec<ProductSuggestion>>, ApiError> {
    Ok(Json(
        state.search.suggestions(&params.q, params.limit).await?,
    ))
}

/// GET /search/filters
pub async fn filters<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<CatalogFilters>, ApiError> {
    Ok(Json(state.search.filters().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let query = SearchParams::default().into_query().unwrap();
        assert_eq!(query.sort_by, SortBy::Newest);
        assert_eq!(query.page, PageRequest::new(Some(1), Some(10)));
        assert_eq!(query.in_stock, None);
    }

    #[test]
    fn test_prices_are_cents() {
        let query = SearchParams {
            min_price: Some(1_000),
            max_price: Some(5_000),
            sort_by: Some("price_desc".to_string()),
            ..SearchParams::default()
        }
        .into_query()
        .unwrap();
        assert_eq!(query.min_price, Some(Money::from_cents(1_000)));
        assert_eq!(query.max_price, Some(Money::from_cents(5_000)));
        assert_eq!(query.sort_by, SortBy::PriceDesc);
    }

    #[test]
    fn test_unknown_sort_is_rejected() {
        let result = SearchParams {
            sort_by: Some("cheapest".to_string()),
            ..SearchParams::default()
        }
        .into_query();
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }
}
