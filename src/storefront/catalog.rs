//! Client-side catalog filtering over the last loaded products.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{dto::products::ProductDetail, routes::params::SortOrder};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilters {
    /// Category slug or display name.
    pub category: Option<String>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub min_rating: Option<f64>,
    pub in_stock: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    Price,
    Rating,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOption {
    pub field: SortField,
    pub direction: SortOrder,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    pub products: Vec<ProductDetail>,
    pub filtered: Vec<ProductDetail>,
    pub selected_category: String,
    pub search_query: String,
    pub is_loading: bool,
    pub error: Option<String>,
}

fn in_category(product: &ProductDetail, category: &str) -> bool {
    product
        .category
        .as_ref()
        .is_some_and(|c| c.slug == category || c.name == category)
}

fn matches_search(product: &ProductDetail, query: &str) -> bool {
    let query = query.to_lowercase();
    product.product.name.to_lowercase().contains(&query)
        || product
            .product
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&query))
}

impl CatalogState {
    pub fn set_products(&mut self, products: Vec<ProductDetail>) {
        self.products = products;
        self.refilter();
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
        self.refilter();
    }

    pub fn set_selected_category(&mut self, category: impl Into<String>) {
        self.selected_category = category.into();
        self.refilter();
    }

    /// Replace `filtered` with the products matching every set filter.
    pub fn apply_filters(&mut self, filters: &ProductFilters) {
        self.filtered = self
            .products
            .iter()
            .filter(|p| {
                filters
                    .category
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .is_none_or(|c| in_category(p, c))
            })
            .filter(|p| filters.min_price_cents.is_none_or(|min| p.product.price_cents >= min))
            .filter(|p| filters.max_price_cents.is_none_or(|max| p.product.price_cents <= max))
            .filter(|p| filters.min_rating.is_none_or(|min| p.rating >= min))
            .filter(|p| filters.in_stock.is_none_or(|want| (p.stock > 0) == want))
            .cloned()
            .collect();
    }

    pub fn sort(&mut self, option: SortOption) {
        self.filtered.sort_by(|a, b| {
            let ord = match option.field {
                SortField::Name => a.product.name.cmp(&b.product.name),
                SortField::Price => a.product.price_cents.cmp(&b.product.price_cents),
                SortField::Rating => a.rating.partial_cmp(&b.rating).unwrap_or(Ordering::Equal),
                SortField::CreatedAt => a.product.created_at.cmp(&b.product.created_at),
            };
            match option.direction {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }

    pub fn clear_filters(&mut self) {
        self.selected_category.clear();
        self.search_query.clear();
        self.filtered = self.products.clone();
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    fn refilter(&mut self) {
        let category = self.selected_category.trim();
        let search = self.search_query.trim();
        self.filtered = self
            .products
            .iter()
            .filter(|p| category.is_empty() || in_category(p, category))
            .filter(|p| search.is_empty() || matches_search(p, search))
            .cloned()
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storefront::fixtures;

    fn loaded() -> CatalogState {
        let mut state = CatalogState::default();
        state.set_products(fixtures::products());
        state
    }

    fn skus(state: &CatalogState) -> Vec<&str> {
        state.filtered.iter().map(|p| p.product.sku.as_str()).collect()
    }

    #[test]
    fn category_and_search_narrow_together() {
        let mut state = loaded();
        assert_eq!(state.filtered.len(), state.products.len());

        state.set_selected_category("cell-phones-accessories");
        assert_eq!(state.filtered.len(), 4);

        state.set_search_query("WIRELESS");
        assert_eq!(skus(&state), vec!["WBH-001", "WCP-007", "NCE-014"]);

        state.clear_filters();
        assert_eq!(state.filtered.len(), state.products.len());
        assert!(state.search_query.is_empty());
    }

    #[test]
    fn category_matches_display_name_too() {
        let mut state = loaded();
        state.set_selected_category("Home & Kitchen");
        assert_eq!(state.filtered.len(), 2);
    }

    #[test]
    fn filters_on_price_rating_and_stock() {
        let mut state = loaded();
        state.apply_filters(&ProductFilters {
            min_price_cents: Some(10000),
            min_rating: Some(4.5),
            ..Default::default()
        });
        assert_eq!(skus(&state), vec!["NCE-014", "IPHONE15PRO", "MBA-M3"]);

        state.apply_filters(&ProductFilters {
            in_stock: Some(false),
            ..Default::default()
        });
        assert_eq!(skus(&state), vec!["SMW-021"]);
    }

    #[test]
    fn sorts_filtered_products() {
        let mut state = loaded();
        state.set_selected_category("electronics");
        state.sort(SortOption {
            field: SortField::Price,
            direction: SortOrder::Desc,
        });
        assert_eq!(skus(&state), vec!["MBA-M3", "IPHONE15PRO", "SMW-021"]);

        state.sort(SortOption {
            field: SortField::Rating,
            direction: SortOrder::Asc,
        });
        assert_eq!(skus(&state), vec!["SMW-021", "IPHONE15PRO", "MBA-M3"]);
    }
}
