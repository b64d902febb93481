use std::collections::HashMap;

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
    sea_query::{Expr, Query, extension::postgres::PgExpr},
};
use uuid::Uuid;

use crate::{
    dto::products::{ProductDetail, ProductList},
    entity::{
        categories::{Column as CategoryCol, Entity as Categories},
        inventory::{Column as InvCol, Entity as InventoryRows},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        reviews::{Column as ReviewCol, Entity as Reviews},
    },
    error::{AppError, AppResult},
    models::{Category, Inventory, Review},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

/// Rows of `inventory` with at least one unit not reserved.
pub(crate) fn available_inventory_subquery() -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .column(InvCol::ProductId)
        .from(InventoryRows)
        .and_where(Expr::expr(Expr::col(InvCol::InStock).sub(Expr::col(InvCol::Reserved))).gt(0))
        .to_owned()
}

/// ILIKE pattern matching `search` literally anywhere in the column.
/// Postgres treats backslash as the default LIKE escape.
pub(crate) fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = contains_pattern(search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(ProdCol::Name).ilike(pattern.clone()))
                .add(Expr::col(ProdCol::Description).ilike(pattern)),
        );
    }

    if let Some(slug) = query.category.as_ref().filter(|s| !s.is_empty()) {
        let category = Categories::find()
            .filter(CategoryCol::Slug.eq(slug.as_str()))
            .one(&state.orm)
            .await?;
        match category {
            Some(c) => condition = condition.add(ProdCol::CategoryId.eq(c.id)),
            None => {
                return Ok(ApiResponse::success(
                    "Products",
                    ProductList { items: vec![] },
                    Some(Meta::new(page, limit, 0)),
                ));
            }
        }
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(ProdCol::PriceCents.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(ProdCol::PriceCents.lte(max_price));
    }

    match query.in_stock {
        Some(true) => {
            condition = condition.add(ProdCol::Id.in_subquery(available_inventory_subquery()))
        }
        Some(false) => {
            condition = condition.add(ProdCol::Id.not_in_subquery(available_inventory_subquery()))
        }
        None => {}
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => ProdCol::CreatedAt,
        ProductSortBy::Price => ProdCol::PriceCents,
        ProductSortBy::Name => ProdCol::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let products = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = hydrate(&state.orm, products).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let product = match Products::find_by_id(id).one(&state.orm).await? {
        Some(p) => p,
        None => return Err(AppError::NotFound("Product")),
    };

    let mut items = hydrate(&state.orm, vec![product]).await?;
    let detail = items
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("product hydration lost a row")))?;
    Ok(ApiResponse::success("Product", detail, Some(Meta::empty())))
}

/// Attach category, inventory and reviews to each product, keeping order.
pub(crate) async fn hydrate<C: ConnectionTrait>(
    conn: &C,
    products: Vec<ProductModel>,
) -> AppResult<Vec<ProductDetail>> {
    if products.is_empty() {
        return Ok(vec![]);
    }
    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let category_ids: Vec<Uuid> = products.iter().filter_map(|p| p.category_id).collect();

    let categories: HashMap<Uuid, Category> = if category_ids.is_empty() {
        HashMap::new()
    } else {
        Categories::find()
            .filter(CategoryCol::Id.is_in(category_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|c| (c.id, Category::from(c)))
            .collect()
    };

    let inventory: HashMap<Uuid, Inventory> = InventoryRows::find()
        .filter(InvCol::ProductId.is_in(ids.clone()))
        .all(conn)
        .await?
        .into_iter()
        .map(|i| (i.product_id, Inventory::from(i)))
        .collect();

    let mut reviews: HashMap<Uuid, Vec<Review>> = HashMap::new();
    for review in Reviews::find()
        .filter(ReviewCol::ProductId.is_in(ids))
        .order_by_desc(ReviewCol::CreatedAt)
        .all(conn)
        .await?
    {
        reviews
            .entry(review.product_id)
            .or_default()
            .push(Review::from(review));
    }

    Ok(products
        .into_iter()
        .map(|model| {
            let category = model.category_id.and_then(|id| categories.get(&id).cloned());
            let stock = inventory.get(&model.id).cloned();
            let product_reviews = reviews.remove(&model.id).unwrap_or_default();
            ProductDetail::new(model.into(), category, stock, product_reviews)
        })
        .collect())
}
