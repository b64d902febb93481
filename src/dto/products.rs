use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Category, Inventory, Product, Review};

/// A product with everything the storefront shows next to it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub category: Option<Category>,
    pub inventory: Option<Inventory>,
    pub reviews: Vec<Review>,
    /// Average review rating, 0 when unreviewed.
    pub rating: f64,
    /// Units available to order.
    pub stock: i32,
}

impl ProductDetail {
    pub fn new(
        product: Product,
        category: Option<Category>,
        inventory: Option<Inventory>,
        reviews: Vec<Review>,
    ) -> Self {
        let rating = average_rating(&reviews);
        let stock = inventory.as_ref().map(Inventory::available).unwrap_or(0);
        Self {
            product,
            category,
            inventory,
            reviews,
            rating,
            stock,
        }
    }
}

pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    sum as f64 / reviews.len() as f64
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<ProductDetail>)]
    pub items: Vec<ProductDetail>,
}
