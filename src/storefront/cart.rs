//! Client-held cart.
//!
//! Line quantities stay within `1..=stock` of the product snapshot they carry.
//! `total_cents` and `item_count` are recomputed after every mutation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dto::{
        orders::{CreateOrderRequest, OrderLineRequest},
        products::ProductDetail,
    },
    models::PaymentMethod,
    storefront::storage::KeyValueStore,
};

pub const CART_KEY: &str = "cart";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("{0} is out of stock")]
    OutOfStock(String),

    #[error("cart item {0} not found")]
    ItemNotFound(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItem {
    pub id: String,
    pub product_id: Uuid,
    pub product: ProductDetail,
    pub quantity: i32,
    pub price_cents: i64,
}

impl CartItem {
    pub fn line_total_cents(&self) -> i64 {
        self.price_cents * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Cart {
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub total_cents: i64,
    #[serde(default)]
    pub item_count: i32,
}

fn clamp_quantity(quantity: i32, stock: i32) -> i32 {
    quantity.clamp(1, stock.max(1))
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, item_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Add `quantity` units, merging onto an existing line for the same product.
    pub fn add(&mut self, product: &ProductDetail, quantity: i32) -> Result<(), CartError> {
        if product.stock <= 0 {
            return Err(CartError::OutOfStock(product.product.name.clone()));
        }
        let quantity = quantity.max(1);

        match self
            .items
            .iter_mut()
            .find(|i| i.product_id == product.product.id)
        {
            Some(item) => {
                item.quantity = clamp_quantity(item.quantity.saturating_add(quantity), product.stock);
                item.product = product.clone();
                item.price_cents = product.product.price_cents;
            }
            None => self.items.push(CartItem {
                id: format!("{}-{}", product.product.id, Utc::now().timestamp_millis()),
                product_id: product.product.id,
                product: product.clone(),
                quantity: clamp_quantity(quantity, product.stock),
                price_cents: product.product.price_cents,
            }),
        }
        self.recompute();
        Ok(())
    }

    pub fn remove(&mut self, item_id: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        if self.items.len() == before {
            return Err(CartError::ItemNotFound(item_id.to_string()));
        }
        self.recompute();
        Ok(())
    }

    pub fn update_quantity(&mut self, item_id: &str, quantity: i32) -> Result<(), CartError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| CartError::ItemNotFound(item_id.to_string()))?;
        item.quantity = clamp_quantity(quantity, item.product.stock);
        self.recompute();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.recompute();
    }

    /// Returns false when no line holds the product.
    pub fn update_item_price(&mut self, product_id: Uuid, price_cents: i64) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.product_id == product_id) else {
            return false;
        };
        item.price_cents = price_cents;
        self.recompute();
        true
    }

    /// Refresh snapshots from server data, dropping lines that can no longer be bought.
    pub fn sync_with_products(&mut self, products: &[ProductDetail]) {
        self.items.retain_mut(|item| {
            let Some(fresh) = products.iter().find(|p| p.product.id == item.product_id) else {
                return false;
            };
            if fresh.stock <= 0 {
                return false;
            }
            item.product = fresh.clone();
            item.price_cents = fresh.product.price_cents;
            item.quantity = clamp_quantity(item.quantity, fresh.stock);
            true
        });
        self.recompute();
    }

    pub fn to_order_request(
        &self,
        shipping_address: impl Into<String>,
        payment_method: PaymentMethod,
    ) -> CreateOrderRequest {
        CreateOrderRequest {
            items: self
                .items
                .iter()
                .map(|i| OrderLineRequest {
                    product_id: i.product_id,
                    quantity: i.quantity,
                })
                .collect(),
            shipping_address: shipping_address.into(),
            payment_method,
        }
    }

    fn recompute(&mut self) {
        self.total_cents = self.items.iter().map(CartItem::line_total_cents).sum();
        self.item_count = self.items.iter().map(|i| i.quantity).sum();
    }
}

/// A [`Cart`] written through to a [`KeyValueStore`] after every change.
#[derive(Debug)]
pub struct CartStore<S> {
    cart: Cart,
    storage: S,
}

impl<S: KeyValueStore> CartStore<S> {
    /// Load the saved cart, or start empty.
    pub fn load(storage: S) -> Self {
        let mut cart = match storage.get(CART_KEY).map(serde_json::from_value::<Cart>) {
            Some(Ok(cart)) => cart,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "saved cart unreadable, starting empty");
                Cart::default()
            }
            None => Cart::default(),
        };
        cart.recompute();
        Self { cart, storage }
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn add(&mut self, product: &ProductDetail, quantity: i32) -> Result<(), CartError> {
        self.cart.add(product, quantity)?;
        self.persist();
        Ok(())
    }

    pub fn remove(&mut self, item_id: &str) -> Result<(), CartError> {
        self.cart.remove(item_id)?;
        self.persist();
        Ok(())
    }

    pub fn update_quantity(&mut self, item_id: &str, quantity: i32) -> Result<(), CartError> {
        self.cart.update_quantity(item_id, quantity)?;
        self.persist();
        Ok(())
    }

    pub fn update_item_price(&mut self, product_id: Uuid, price_cents: i64) -> bool {
        let changed = self.cart.update_item_price(product_id, price_cents);
        if changed {
            self.persist();
        }
        changed
    }

    pub fn sync_with_products(&mut self, products: &[ProductDetail]) {
        self.cart.sync_with_products(products);
        self.persist();
    }

    pub fn clear(&mut self) {
        self.cart.clear();
        if let Err(err) = self.storage.remove(CART_KEY) {
            tracing::warn!(error = %err, "failed to remove saved cart");
        }
    }

    fn persist(&mut self) {
        let value = match serde_json::to_value(&self.cart) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode cart");
                return;
            }
        };
        if let Err(err) = self.storage.set(CART_KEY, &value) {
            tracing::warn!(error = %err, "failed to save cart");
        }
    }
}
