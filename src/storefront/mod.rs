//! Client-side store kept in sync with the API.
//!
//! [`Storefront`] owns the HTTP client and the cart, auth, order and catalog
//! state. Cart and tokens are persisted through a [`KeyValueStore`]; the
//! order and catalog state live only in memory.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod client;
pub mod fixtures;
pub mod orders;
pub mod storage;

use std::collections::HashSet;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    dto::{
        auth::{LoginRequest, SignupRequest},
        orders::{CreatedOrder, OrderDetail},
        products::ProductDetail,
    },
    models::PaymentMethod,
    routes::params::{OrderListQuery, ProductQuery},
};

pub use auth::{AuthState, AuthStore};
pub use cart::{Cart, CartError, CartItem, CartStore};
pub use catalog::{CatalogState, ProductFilters, SortField, SortOption};
pub use client::{ApiClient, ClientError, ProductPage};
pub use orders::OrderState;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};

#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Please log in to continue")]
    NotAuthenticated,
}

#[derive(Debug)]
pub struct Storefront<S> {
    client: ApiClient,
    cart: CartStore<S>,
    auth: AuthStore<S>,
    orders: OrderState,
    catalog: CatalogState,
}

impl<S: KeyValueStore + Clone> Storefront<S> {
    /// Load the saved cart and tokens from `storage`.
    pub fn new(mut client: ApiClient, storage: S) -> Self {
        let cart = CartStore::load(storage.clone());
        let auth = AuthStore::load(storage);
        client.set_token(auth.state().access_token.clone());
        Self {
            client,
            cart,
            auth,
            orders: OrderState::default(),
            catalog: CatalogState::default(),
        }
    }
}

impl<S: KeyValueStore> Storefront<S> {
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn cart(&self) -> &Cart {
        self.cart.cart()
    }

    pub fn cart_mut(&mut self) -> &mut CartStore<S> {
        &mut self.cart
    }

    pub fn auth(&self) -> &AuthState {
        self.auth.state()
    }

    pub fn orders(&self) -> &OrderState {
        &self.orders
    }

    pub fn catalog(&self) -> &CatalogState {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut CatalogState {
        &mut self.catalog
    }

    /// Confirm saved tokens with the API, refreshing once if the access token expired.
    pub async fn restore(&mut self) -> Result<(), StorefrontError> {
        if self.auth.state().tokens().is_none() {
            return Ok(());
        }
        match self.authed(async |client| client.me().await).await {
            Ok(me) => {
                self.auth.state_mut().set_user(me.user);
                Ok(())
            }
            Err(err) if err.is_unauthorized() => {
                tracing::info!("saved session expired");
                self.logout();
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Run an authenticated call. On 401 the access token is refreshed and
    /// the call retried once; a session the API still rejects is cleared.
    async fn authed<T>(
        &mut self,
        call: impl AsyncFn(&ApiClient) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let err = match call(&self.client).await {
            Err(err) if err.is_unauthorized() => err,
            other => return other,
        };
        if !self.refresh_tokens().await {
            return Err(err);
        }
        let retried = call(&self.client).await;
        if retried.as_ref().is_err_and(ClientError::is_unauthorized) {
            self.logout();
        }
        retried
    }

    async fn refresh_tokens(&mut self) -> bool {
        let Some(tokens) = self.auth.state().tokens() else {
            return false;
        };
        match self.client.refresh(&tokens.refresh_token).await {
            Ok(fresh) => {
                self.client.set_token(Some(fresh.access_token.clone()));
                self.auth.set_tokens(fresh);
                true
            }
            // offline: keep the session for later
            Err(ClientError::Transport(err)) => {
                tracing::warn!(error = %err, "token refresh failed");
                false
            }
            Err(err) => {
                tracing::info!(error = %err, "refresh token rejected, signing out");
                self.logout();
                false
            }
        }
    }

    pub async fn login(
        &mut self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), StorefrontError> {
        self.auth.state_mut().login_pending();
        let request = LoginRequest {
            email: email.into(),
            password: password.into(),
        };
        match self.client.login(&request).await {
            Ok(session) => {
                self.client.set_token(Some(session.tokens.access_token.clone()));
                self.auth.login_succeeded(session);
                Ok(())
            }
            Err(err) => {
                self.auth.login_failed(err.user_message());
                self.client.set_token(None);
                Err(err.into())
            }
        }
    }

    pub async fn signup(&mut self, request: SignupRequest) -> Result<(), StorefrontError> {
        self.auth.state_mut().login_pending();
        match self.client.signup(&request).await {
            Ok(session) => {
                self.client.set_token(Some(session.tokens.access_token.clone()));
                self.auth.login_succeeded(session);
                Ok(())
            }
            Err(err) => {
                self.auth.login_failed(err.user_message());
                Err(err.into())
            }
        }
    }

    pub fn logout(&mut self) {
        self.auth.clear();
        self.client.set_token(None);
        self.orders = OrderState::default();
    }

    /// Load a catalog page, then bring the cart in line with current prices and stock.
    pub async fn refresh_catalog(&mut self, query: &ProductQuery) -> Result<(), StorefrontError> {
        self.catalog.set_loading(true);
        let page = match self.client.list_products(query).await {
            Ok(page) => page,
            Err(err) => {
                self.catalog.set_loading(false);
                self.catalog.set_error(Some(err.user_message()));
                return Err(err.into());
            }
        };
        self.catalog.set_loading(false);
        self.catalog.set_error(None);

        let fresh = self.fresh_cart_products(&page.items).await;
        self.catalog.set_products(page.items);
        self.cart.sync_with_products(&fresh);
        Ok(())
    }

    // Cart lines outside the loaded page are looked up one by one. A product
    // the API no longer knows is left out so the sync drops its line.
    async fn fresh_cart_products(&self, page: &[ProductDetail]) -> Vec<ProductDetail> {
        let listed: HashSet<Uuid> = page.iter().map(|p| p.product.id).collect();
        let mut fresh = page.to_vec();
        for item in &self.cart.cart().items {
            if listed.contains(&item.product_id) {
                continue;
            }
            match self.client.get_product(item.product_id).await {
                Ok(product) => fresh.push(product),
                Err(ClientError::NotFound(_)) => {}
                Err(err) => {
                    tracing::warn!(error = %err, product_id = %item.product_id, "keeping cached cart product");
                    fresh.push(item.product.clone());
                }
            }
        }
        fresh
    }

    pub fn add_to_cart(
        &mut self,
        product: &ProductDetail,
        quantity: i32,
    ) -> Result<(), StorefrontError> {
        self.cart.add(product, quantity)?;
        Ok(())
    }

    /// Submit the cart as an order. The cart is cleared only when the API accepts it.
    pub async fn checkout(
        &mut self,
        shipping_address: impl Into<String>,
        payment_method: PaymentMethod,
    ) -> Result<CreatedOrder, StorefrontError> {
        if !self.auth.state().is_authenticated && self.client.token().is_none() {
            return Err(StorefrontError::NotAuthenticated);
        }
        if self.cart.cart().is_empty() {
            return Err(StorefrontError::EmptyCart);
        }

        let request = self
            .cart
            .cart()
            .to_order_request(shipping_address, payment_method);

        self.orders.set_loading(true);
        self.orders.clear_error();
        let result = self
            .authed(async |client| client.create_order(&request).await)
            .await;
        self.orders.set_loading(false);

        match result {
            Ok(created) => {
                self.orders.add_order(created.order.clone());
                self.cart.clear();
                Ok(created)
            }
            Err(err) => {
                self.orders.set_error(err.user_message());
                Err(err.into())
            }
        }
    }

    pub async fn load_orders(&mut self) -> Result<(), StorefrontError> {
        self.orders.set_loading(true);
        let query = OrderListQuery::default();
        let result = self
            .authed(async |client| client.list_orders(&query).await)
            .await;
        self.orders.set_loading(false);
        match result {
            Ok((orders, _)) => {
                self.orders.clear_error();
                self.orders.set_orders(orders);
                Ok(())
            }
            Err(err) => {
                self.orders.set_error(err.user_message());
                Err(err.into())
            }
        }
    }

    pub async fn verify_payment(&mut self, order_id: Uuid) -> Result<OrderDetail, StorefrontError> {
        let order = self
            .authed(async |client| client.verify_payment(order_id).await)
            .await?;
        self.orders.update_order(order.clone());
        Ok(order)
    }
}
