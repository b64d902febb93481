//! Built-in catalog served when the API cannot be reached.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    dto::products::ProductDetail,
    models::{Category, Inventory, Product},
    response::Meta,
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
};

struct Fixture {
    n: u128,
    sku: &'static str,
    name: &'static str,
    description: &'static str,
    category: (&'static str, &'static str),
    price_cents: i64,
    stock: i32,
    rating: f64,
    created: i64,
}

const PHONES: (&str, &str) = ("Cell Phones & Accessories", "cell-phones-accessories");
const ELECTRONICS: (&str, &str) = ("Electronics", "electronics");
const HOME: (&str, &str) = ("Home & Kitchen", "home-kitchen");

// 2024-01-01T00:00:00Z
const EPOCH_2024: i64 = 1_704_067_200;
const DAY: i64 = 86_400;

const FIXTURES: &[Fixture] = &[
    Fixture {
        n: 1,
        sku: "WBH-001",
        name: "Wireless Bluetooth Headphones",
        description: "High-quality wireless headphones with active noise cancellation and 30-hour battery life.",
        category: PHONES,
        price_cents: 9999,
        stock: 50,
        rating: 4.5,
        created: 0,
    },
    Fixture {
        n: 2,
        sku: "WCP-007",
        name: "Wireless Charging Pad",
        description: "Fast wireless charging pad compatible with all Qi-enabled devices.",
        category: PHONES,
        price_cents: 3999,
        stock: 60,
        rating: 4.2,
        created: 6,
    },
    Fixture {
        n: 3,
        sku: "MPB-013",
        name: "MagSafe Power Bank",
        description: "Portable magnetic power bank with 10,000mAh capacity.",
        category: PHONES,
        price_cents: 5999,
        stock: 70,
        rating: 4.3,
        created: 31,
    },
    Fixture {
        n: 4,
        sku: "NCE-014",
        name: "Noise Cancelling Earbuds",
        description: "True wireless earbuds with touch controls and water resistance.",
        category: PHONES,
        price_cents: 12999,
        stock: 90,
        rating: 4.6,
        created: 35,
    },
    Fixture {
        n: 5,
        sku: "IPHONE15PRO",
        name: "iPhone 15 Pro",
        description: "Titanium design with the A17 Pro chip and a 48MP main camera.",
        category: ELECTRONICS,
        price_cents: 99900,
        stock: 12,
        rating: 4.8,
        created: 10,
    },
    Fixture {
        n: 6,
        sku: "MBA-M3",
        name: "MacBook Air M3",
        description: "Thin and light laptop with all-day battery, perfect for development work.",
        category: ELECTRONICS,
        price_cents: 129900,
        stock: 3,
        rating: 4.9,
        created: 20,
    },
    Fixture {
        n: 7,
        sku: "SMW-021",
        name: "Smart Watch Series 9",
        description: "Fitness tracking, heart-rate monitoring and always-on display.",
        category: ELECTRONICS,
        price_cents: 39900,
        stock: 0,
        rating: 4.4,
        created: 40,
    },
    Fixture {
        n: 8,
        sku: "CFM-030",
        name: "Espresso Coffee Maker",
        description: "15-bar pump espresso machine with milk frother.",
        category: HOME,
        price_cents: 18999,
        stock: 25,
        rating: 4.1,
        created: 15,
    },
    Fixture {
        n: 9,
        sku: "AFR-031",
        name: "Digital Air Fryer",
        description: "5.8-quart air fryer with eight presets and a dishwasher-safe basket.",
        category: HOME,
        price_cents: 8999,
        stock: 40,
        rating: 4.0,
        created: 45,
    },
];

fn category_id(slug: &str) -> Uuid {
    match slug {
        "cell-phones-accessories" => Uuid::from_u128(0xC001),
        "electronics" => Uuid::from_u128(0xC002),
        _ => Uuid::from_u128(0xC003),
    }
}

fn build(f: &Fixture) -> ProductDetail {
    let id = Uuid::from_u128(f.n);
    let created_at: DateTime<Utc> =
        DateTime::from_timestamp(EPOCH_2024 + f.created * DAY, 0).unwrap_or_default();
    let (category_name, category_slug) = f.category;
    let cat_id = category_id(category_slug);

    ProductDetail {
        product: Product {
            id,
            sku: f.sku.to_string(),
            name: f.name.to_string(),
            slug: f.name.to_lowercase().replace(' ', "-"),
            description: Some(f.description.to_string()),
            price_cents: f.price_cents,
            images: json!([format!("https://picsum.photos/400/400?random={}", f.n)]),
            category_id: Some(cat_id),
            created_at,
            updated_at: created_at,
        },
        category: Some(Category {
            id: cat_id,
            name: category_name.to_string(),
            slug: category_slug.to_string(),
        }),
        inventory: Some(Inventory {
            product_id: id,
            in_stock: f.stock,
            reserved: 0,
        }),
        reviews: vec![],
        rating: f.rating,
        stock: f.stock,
    }
}

pub fn products() -> Vec<ProductDetail> {
    FIXTURES.iter().map(build).collect()
}

pub fn product(id: Uuid) -> Option<ProductDetail> {
    products().into_iter().find(|p| p.product.id == id)
}

/// Apply a catalog query to the fixtures the way the API applies it to rows.
pub fn query(query: &ProductQuery) -> (Vec<ProductDetail>, Meta) {
    let search = query
        .q
        .as_ref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut items: Vec<ProductDetail> = products()
        .into_iter()
        .filter(|p| match &search {
            Some(term) => {
                p.product.name.to_lowercase().contains(term)
                    || p
                        .product
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(term))
            }
            None => true,
        })
        .filter(|p| match query.category.as_deref().filter(|c| !c.is_empty()) {
            Some(slug) => p.category.as_ref().is_some_and(|c| c.slug == slug),
            None => true,
        })
        .filter(|p| query.min_price.is_none_or(|min| p.product.price_cents >= min))
        .filter(|p| query.max_price.is_none_or(|max| p.product.price_cents <= max))
        .filter(|p| query.in_stock.is_none_or(|want| (p.stock > 0) == want))
        .collect();

    let desc = query.sort_order.unwrap_or(SortOrder::Desc) == SortOrder::Desc;
    match query.sort_by.unwrap_or(ProductSortBy::CreatedAt) {
        ProductSortBy::CreatedAt => items.sort_by_key(|p| p.product.created_at),
        ProductSortBy::Price => items.sort_by_key(|p| p.product.price_cents),
        ProductSortBy::Name => items.sort_by(|a, b| a.product.name.cmp(&b.product.name)),
    }
    if desc {
        items.reverse();
    }

    let (page, per_page, offset) = query.pagination().normalize();
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(offset as usize)
        .take(per_page as usize)
        .collect();
    (items, Meta::new(page, per_page, total))
}
