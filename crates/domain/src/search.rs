//! Product search criteria and catalog facets.

use common::{CategoryId, PageRequest, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Money;

/// Result ordering for product search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    /// Most frequently ordered first.
    BestSelling,
}

impl std::str::FromStr for SortBy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(SortBy::Newest),
            "price_asc" => Ok(SortBy::PriceAsc),
            "price_desc" => Ok(SortBy::PriceDesc),
            "best_selling" => Ok(SortBy::BestSelling),
            other => Err(DomainError::validation(format!("unknown sort order: {other}"))),
        }
    }
}

/// Filters applied by product search. All filters are conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    /// Case-insensitive substring of the name or description.
    pub text: Option<String>,
    /// Category name, matched case-insensitively.
    pub category: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    /// `Some(true)` keeps stock > 0, `Some(false)` keeps stock == 0.
    pub in_stock: Option<bool>,
    pub sort_by: SortBy,
    pub page: PageRequest,
}

impl ProductQuery {
    /// Normalizes blank strings to `None` and rejects an inverted price range.
    pub fn normalized(mut self) -> Result<Self, DomainError> {
        self.text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self.category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if let (Some(min), Some(max)) = (self.min_price, self.max_price)
            && min > max
        {
            return Err(DomainError::validation(
                "minimum price must not exceed maximum price",
            ));
        }
        Ok(self)
    }
}

/// Compact product entry for type-ahead suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSuggestion {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub price: Money,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: Money,
    pub max: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockStatus {
    pub in_stock: u64,
    pub out_of_stock: u64,
}

/// Facets offered to search clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFilters {
    pub categories: Vec<CategoryFacet>,
    pub price_range: PriceRange,
    pub stock_status: StockStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFacet {
    pub id: CategoryId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parsing() {
        assert_eq!("price_desc".parse::<SortBy>().unwrap(), SortBy::PriceDesc);
        assert_eq!("best_selling".parse::<SortBy>().unwrap(), SortBy::BestSelling);
        assert!("random".parse::<SortBy>().is_err());
        assert_eq!(SortBy::default(), SortBy::Newest);
    }

    #[test]
    fn test_normalized_drops_blank_filters() {
        let query = ProductQuery {
            text: Some("  ".to_string()),
            category: Some(" Decor ".to_string()),
            ..Default::default()
        }
        .normalized()
        .unwrap();
        assert_eq!(query.text, None);
        assert_eq!(query.category.as_deref(), Some("Decor"));
    }

    #[test]
    fn test_normalized_rejects_inverted_range() {
        let query = ProductQuery {
            min_price: Some(Money::from_units(10)),
            max_price: Some(Money::from_units(5)),
            ..Default::default()
        };
        assert!(query.normalized().is_err());
    }
}
