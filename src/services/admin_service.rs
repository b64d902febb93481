use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
    sea_query::{Expr, LockType, Query},
};
use uuid::Uuid;

use crate::{
    dto::{
        admin::{LowStockList, LowStockQuery, UpdateOrderStatusRequest},
        orders::{OrderDetail, OrderList},
    },
    entity::{
        inventory::{Column as InvCol, Entity as InventoryRows},
        orders::Entity as Orders,
        payments::{Column as PaymentCol, Entity as Payments},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{OrderStatus, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::{
        event_service::{category, record_domain_event},
        order_service::{
            items_of, list_with_condition, load_detail, release_reservation, set_order_status,
            set_payment_status,
        },
        product_service::hydrate,
    },
    state::AppState,
};

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    list_with_condition(state, Condition::all(), query).await
}

/// Whether an order may move from `from` to `to`.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    match (from, to) {
        (a, b) if a == b => true,
        (OrderStatus::Cancelled, _) => false,
        (OrderStatus::Delivered, OrderStatus::Cancelled) => false,
        _ => true,
    }
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    ensure_admin(user)?;
    let next: OrderStatus = payload.status.trim().parse()?;

    let txn = state.orm.begin().await?;

    let order = match Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    {
        Some(o) => o,
        None => return Err(AppError::NotFound("Order")),
    };

    let current: OrderStatus = order.status.parse()?;
    if !can_transition(current, next) {
        return Err(AppError::BadRequest(format!(
            "Cannot change order from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let order = if current == next {
        order
    } else {
        if next == OrderStatus::Cancelled {
            let payment = Payments::find()
                .filter(PaymentCol::OrderId.eq(order.id))
                .one(&txn)
                .await?;
            let paid = match &payment {
                Some(p) => p.status.parse::<PaymentStatus>()? == PaymentStatus::Completed,
                None => false,
            };
            // paid orders already took their units off the shelf
            if !paid {
                let items = items_of(&txn, order.id).await?;
                release_reservation(&txn, &items).await?;
            }
            if let Some(payment) = payment {
                if payment.status.parse::<PaymentStatus>()? == PaymentStatus::Pending {
                    set_payment_status(&txn, payment, PaymentStatus::Failed).await?;
                }
            }
        }
        set_order_status(&txn, order, next).await?
    };

    let detail = load_detail(&txn, order).await?;
    txn.commit().await?;

    tracing::info!(order_id = %id, from = current.as_str(), to = next.as_str(), "order status updated");
    record_domain_event(
        &state.pool,
        "order_status_updated",
        category::ORDER,
        Some(user.user_id),
        serde_json::json!({ "order_id": id, "from": current, "to": next }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        detail,
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<LowStockList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD).max(0);
    let (page, limit, offset) = query.pagination().normalize();

    let low = Query::select()
        .column(InvCol::ProductId)
        .from(InventoryRows)
        .and_where(
            Expr::expr(Expr::col(InvCol::InStock).sub(Expr::col(InvCol::Reserved))).lte(threshold),
        )
        .to_owned();

    let finder = Products::find()
        .filter(ProdCol::Id.in_subquery(low))
        .order_by_asc(ProdCol::Name);

    let total = finder.clone().count(&state.orm).await? as i64;

    let products = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let mut items = hydrate(&state.orm, products).await?;
    items.sort_by_key(|p| p.stock);

    Ok(ApiResponse::success(
        "Low stock products",
        LowStockList { items },
        Some(Meta::new(page, limit, total)),
    ))
}
