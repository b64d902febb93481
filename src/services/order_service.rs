use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    ActiveValue::NotSet,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CreateOrderRequest, CreatedOrder, OrderDetail, OrderItemDetail, OrderLineRequest,
        OrderList,
    },
    entity::{
        inventory::{Column as InvCol, Entity as InventoryRows},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
        },
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentStatus, Product},
    payments::{PaymentError, PaymentGateway, PaymentProvider, PaymentRequest},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::event_service::{category, record_domain_event},
    state::AppState,
};

const MIN_SHIPPING_ADDRESS_LEN: usize = 10;

/// Shipping is free for every order.
pub const SHIPPING_CENTS: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
}

pub fn compute_totals(lines: &[PricedLine], shipping_cents: i64) -> OrderTotals {
    let subtotal_cents = lines
        .iter()
        .map(|line| line.unit_price_cents * i64::from(line.quantity))
        .sum();
    OrderTotals {
        subtotal_cents,
        shipping_cents,
        total_cents: subtotal_cents + shipping_cents,
    }
}

/// Check the request and merge repeated product lines, keeping first-seen order.
pub fn validate_create_order(payload: &CreateOrderRequest) -> AppResult<Vec<OrderLineRequest>> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest(
            "Order must contain at least one item".into(),
        ));
    }
    if payload.shipping_address.trim().chars().count() < MIN_SHIPPING_ADDRESS_LEN {
        return Err(AppError::BadRequest(
            "Shipping address must be at least 10 characters".into(),
        ));
    }

    let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        if item.quantity < 1 {
            return Err(AppError::BadRequest("Quantity must be at least 1".into()));
        }
        match merged.iter_mut().find(|l| l.product_id == item.product_id) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or_else(|| AppError::BadRequest("Quantity too large".into()))?;
            }
            None => merged.push(item.clone()),
        }
    }
    Ok(merged)
}

/// Look up the client for `method`. An unconfigured provider answers 400.
pub(crate) fn provider_for(
    gateway: &PaymentGateway,
    method: PaymentMethod,
) -> AppResult<Arc<dyn PaymentProvider>> {
    gateway.provider(method).map_err(|err| match err {
        PaymentError::NotConfigured(method) => {
            AppError::BadRequest(format!("{method} payments are not available"))
        }
        other => other.into(),
    })
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<CreatedOrder>> {
    let lines = validate_create_order(&payload)?;
    let provider = provider_for(&state.payments, payload.payment_method)?;

    if payload.payment_method == PaymentMethod::Paystack && user.email.trim().is_empty() {
        return Err(AppError::BadRequest(
            "User email required for Paystack".into(),
        ));
    }

    let txn = state.orm.begin().await?;

    let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<Uuid, Product> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids.clone()))
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, Product::from(p)))
        .collect();

    if products.len() != product_ids.len() {
        return Err(AppError::BadRequest("Some products not found".into()));
    }

    let inventory: HashMap<Uuid, i32> = InventoryRows::find()
        .filter(InvCol::ProductId.is_in(product_ids))
        .order_by_asc(InvCol::ProductId)
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|row| (row.product_id, (row.in_stock - row.reserved).max(0)))
        .collect();

    let mut priced: Vec<PricedLine> = Vec::with_capacity(lines.len());
    for line in &lines {
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| AppError::BadRequest("Some products not found".into()))?;
        let available = inventory.get(&line.product_id).copied().unwrap_or(0);
        if available < line.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.name
            )));
        }
        priced.push(PricedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price_cents: product.price_cents,
        });
    }

    let totals = compute_totals(&priced, SHIPPING_CENTS);

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        status: Set(OrderStatus::Pending.as_str().into()),
        subtotal_cents: Set(totals.subtotal_cents),
        shipping_cents: Set(totals.shipping_cents),
        total_cents: Set(totals.total_cents),
        shipping_addr: Set(payload.shipping_address.trim().to_string()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItemModel> = Vec::with_capacity(priced.len());
    for line in &priced {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            unit_price_cents: Set(line.unit_price_cents),
        }
        .insert(&txn)
        .await?;
        items.push(item);

        // reserve stock until the payment settles
        InventoryRows::update_many()
            .col_expr(InvCol::Reserved, Expr::col(InvCol::Reserved).add(line.quantity))
            .filter(InvCol::ProductId.eq(line.product_id))
            .exec(&txn)
            .await?;
    }

    let init = provider
        .initialize(&PaymentRequest {
            order_id: order.id,
            user_id: user.user_id,
            email: user.email.clone(),
            amount_cents: totals.total_cents,
            currency: state.config.payment_currency.clone(),
        })
        .await?;

    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        provider: Set(payload.payment_method.as_str().into()),
        provider_ref: Set(init.reference.clone()),
        amount_cents: Set(totals.total_cents),
        currency: Set(state.config.payment_currency.clone()),
        status: Set(PaymentStatus::Pending.as_str().into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        total_cents = totals.total_cents,
        provider = %payload.payment_method,
        "order created"
    );

    record_domain_event(
        &state.pool,
        "order_created",
        category::ORDER,
        Some(user.user_id),
        serde_json::json!({
            "order_id": order.id,
            "total_cents": totals.total_cents,
            "payment_method": payload.payment_method,
        }),
    )
    .await;

    let detail = OrderDetail {
        order: Order::try_from(order)?,
        items: items
            .into_iter()
            .map(|item| {
                let product = products.get(&item.product_id).cloned();
                OrderItemDetail {
                    item: OrderItem::from(item),
                    product,
                }
            })
            .collect(),
        payment: Some(Payment::try_from(payment)?),
    };

    Ok(ApiResponse::success(
        "Order created",
        CreatedOrder {
            order: detail,
            payment: init,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    list_with_condition(state, condition, query).await
}

/// Shared by the customer and admin listings.
pub(crate) async fn list_with_condition(
    state: &AppState,
    mut condition: Condition,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status: OrderStatus = status.parse()?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = load_details(&state.orm, orders).await?;

    Ok(ApiResponse::success(
        "Orders",
        OrderList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound("Order")),
    };

    let detail = load_detail(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", detail, Some(Meta::empty())))
}

/// Ask the provider for the payment outcome and settle the order accordingly.
pub async fn verify_payment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound("Order")),
    };

    let payment = match Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .one(&txn)
        .await?
    {
        Some(p) => p,
        None => return Err(AppError::NotFound("Payment")),
    };

    // a cancelled order has already given its reservation back
    let current: PaymentStatus = payment.status.parse()?;
    let order_status: OrderStatus = order.status.parse()?;
    if current != PaymentStatus::Pending || order_status == OrderStatus::Cancelled {
        let detail = load_detail(&txn, order).await?;
        txn.commit().await?;
        return Ok(ApiResponse::success(
            "Payment already settled",
            detail,
            Some(Meta::empty()),
        ));
    }

    let method: PaymentMethod = payment.provider.parse()?;
    let outcome = provider_for(&state.payments, method)?
        .verify(&payment.provider_ref)
        .await?;

    let order = match outcome {
        PaymentStatus::Pending => order,
        PaymentStatus::Completed => {
            let items = items_of(&txn, order.id).await?;
            commit_reservation(&txn, &items).await?;
            set_payment_status(&txn, payment, PaymentStatus::Completed).await?;
            set_order_status(&txn, order, OrderStatus::Processing).await?
        }
        PaymentStatus::Failed => {
            let items = items_of(&txn, order.id).await?;
            release_reservation(&txn, &items).await?;
            set_payment_status(&txn, payment, PaymentStatus::Failed).await?;
            set_order_status(&txn, order, OrderStatus::Cancelled).await?
        }
    };

    let detail = load_detail(&txn, order).await?;
    txn.commit().await?;

    if outcome != PaymentStatus::Pending {
        record_domain_event(
            &state.pool,
            "payment_verified",
            category::PAYMENT,
            Some(user.user_id),
            serde_json::json!({ "order_id": detail.order.id, "status": outcome }),
        )
        .await;
    }

    Ok(ApiResponse::success(
        "Payment verified",
        detail,
        Some(Meta::empty()),
    ))
}

pub(crate) async fn items_of<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Vec<OrderItemModel>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?)
}

/// Paid: the reserved units leave the shelf.
pub(crate) async fn commit_reservation(
    txn: &DatabaseTransaction,
    items: &[OrderItemModel],
) -> AppResult<()> {
    for item in items {
        InventoryRows::update_many()
            .col_expr(InvCol::InStock, Expr::col(InvCol::InStock).sub(item.quantity))
            .col_expr(InvCol::Reserved, Expr::col(InvCol::Reserved).sub(item.quantity))
            .filter(InvCol::ProductId.eq(item.product_id))
            .exec(txn)
            .await?;
    }
    Ok(())
}

/// Unpaid and abandoned: the reserved units become available again.
pub(crate) async fn release_reservation(
    txn: &DatabaseTransaction,
    items: &[OrderItemModel],
) -> AppResult<()> {
    for item in items {
        InventoryRows::update_many()
            .col_expr(InvCol::Reserved, Expr::col(InvCol::Reserved).sub(item.quantity))
            .filter(InvCol::ProductId.eq(item.product_id))
            .exec(txn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn set_order_status(
    txn: &DatabaseTransaction,
    order: OrderModel,
    status: OrderStatus,
) -> AppResult<OrderModel> {
    let mut active: OrderActive = order.into();
    active.status = Set(status.as_str().into());
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(txn).await?)
}

pub(crate) async fn set_payment_status(
    txn: &DatabaseTransaction,
    payment: crate::entity::payments::Model,
    status: PaymentStatus,
) -> AppResult<()> {
    let mut active: PaymentActive = payment.into();
    active.status = Set(status.as_str().into());
    active.updated_at = Set(Utc::now().into());
    active.update(txn).await?;
    Ok(())
}

pub(crate) async fn load_detail<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderDetail> {
    let mut details = load_details(conn, vec![order]).await?;
    details
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order detail lost a row")))
}

/// Attach items (with their products) and payment to each order, keeping order.
pub(crate) async fn load_details<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<OrderModel>,
) -> AppResult<Vec<OrderDetail>> {
    if orders.is_empty() {
        return Ok(vec![]);
    }
    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(order_ids.clone()))
        .all(conn)
        .await?;

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let products: HashMap<Uuid, Product> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        Products::find()
            .filter(ProdCol::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, Product::from(p)))
            .collect()
    };

    let mut items_by_order: HashMap<Uuid, Vec<OrderItemDetail>> = HashMap::new();
    for item in items {
        let product = products.get(&item.product_id).cloned();
        items_by_order
            .entry(item.order_id)
            .or_default()
            .push(OrderItemDetail {
                item: OrderItem::from(item),
                product,
            });
    }

    let mut payments: HashMap<Uuid, Payment> = HashMap::new();
    for payment in Payments::find()
        .filter(PaymentCol::OrderId.is_in(order_ids))
        .all(conn)
        .await?
    {
        payments.insert(payment.order_id, Payment::try_from(payment)?);
    }

    orders
        .into_iter()
        .map(|order| {
            let id = order.id;
            Ok(OrderDetail {
                order: Order::try_from(order)?,
                items: items_by_order.remove(&id).unwrap_or_default(),
                payment: payments.remove(&id),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i32) -> OrderLineRequest {
        OrderLineRequest {
            product_id: Uuid::new_v4(),
            quantity,
        }
    }

    fn request(items: Vec<OrderLineRequest>) -> CreateOrderRequest {
        CreateOrderRequest {
            items,
            shipping_address: "12 Marina Road, Lagos".into(),
            payment_method: PaymentMethod::Stripe,
        }
    }

    #[test]
    fn total_is_sum_of_unit_price_times_quantity() {
        let lines = [
            PricedLine {
                product_id: Uuid::new_v4(),
                quantity: 2,
                unit_price_cents: 99900,
            },
            PricedLine {
                product_id: Uuid::new_v4(),
                quantity: 1,
                unit_price_cents: 39900,
            },
        ];
        let totals = compute_totals(&lines, SHIPPING_CENTS);
        assert_eq!(totals.subtotal_cents, 2 * 99900 + 39900);
        assert_eq!(totals.shipping_cents, 0);
        assert_eq!(totals.total_cents, totals.subtotal_cents);

        let with_shipping = compute_totals(&lines, 500);
        assert_eq!(with_shipping.total_cents, with_shipping.subtotal_cents + 500);
    }

    #[test]
    fn empty_order_has_zero_total() {
        assert_eq!(compute_totals(&[], 0).total_cents, 0);
    }

    #[test]
    fn rejects_empty_items_and_short_address() {
        assert!(validate_create_order(&request(vec![])).is_err());

        let mut short = request(vec![line(1)]);
        short.shipping_address = "Lagos".into();
        assert!(matches!(
            validate_create_order(&short),
            Err(AppError::BadRequest(msg)) if msg.contains("Shipping address")
        ));
    }

    #[test]
    fn rejects_quantity_below_one() {
        let err = validate_create_order(&request(vec![line(0)])).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Quantity must be at least 1"));
    }

    #[test]
    fn merged_quantity_overflow_is_rejected() {
        let first = line(i32::MAX);
        let repeat = OrderLineRequest {
            product_id: first.product_id,
            quantity: 1,
        };
        let err = validate_create_order(&request(vec![first, repeat])).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Quantity too large"));
    }

    #[test]
    fn unconfigured_provider_is_a_bad_request() {
        let gateway = PaymentGateway::new();
        let err = provider_for(&gateway, PaymentMethod::Paystack).err().unwrap();
        assert!(matches!(
            err,
            AppError::BadRequest(msg) if msg == "paystack payments are not available"
        ));
    }

    #[test]
    fn merges_repeated_product_lines() {
        let first = line(2);
        let second = line(1);
        let repeat = OrderLineRequest {
            product_id: first.product_id,
            quantity: 3,
        };
        let merged =
            validate_create_order(&request(vec![first.clone(), second.clone(), repeat])).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].product_id, first.product_id);
        assert_eq!(merged[0].quantity, 5);
        assert_eq!(merged[1], second);
    }
}
