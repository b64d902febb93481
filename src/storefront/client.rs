//! HTTP client for the storefront API.
//!
//! Product reads fall back to the built-in fixture catalog when the API is
//! unreachable or the client runs with `use_dummy_data`.

use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dto::{
        auth::{AuthSession, LoginRequest, MeResponse, RefreshRequest, SignupRequest, TokenPair},
        events::{CreateEventRequest, EventCreated},
        orders::{CreateOrderRequest, CreatedOrder, OrderDetail},
        products::ProductDetail,
    },
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, ProductQuery},
    storefront::fixtures,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    /// The API could not be reached at all.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Api { status: 401, .. })
    }

    /// Message suitable for showing next to a form.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            ClientError::NotFound(what) => format!("{what} not found"),
            ClientError::Transport(_) => "Service unavailable, try again later".to_string(),
            ClientError::Decode(_) => "Unexpected response from server".to_string(),
        }
    }
}

/// One page of catalog results.
#[derive(Debug, Clone)]
pub struct ProductPage {
    pub items: Vec<ProductDetail>,
    pub meta: Option<Meta>,
    /// Served from the built-in catalog instead of the API.
    pub from_fixtures: bool,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    use_dummy_data: bool,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("use_dummy_data", &self.use_dummy_data)
            .finish()
    }
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://localhost:5000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ClientError::Transport)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            use_dummy_data: false,
        })
    }

    #[must_use]
    pub fn with_dummy_data(mut self, use_dummy_data: bool) -> Self {
        self.use_dummy_data = use_dummy_data;
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/api{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn envelope<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<ApiResponse<T>, ClientError> {
        let response = builder.send().await.map_err(ClientError::Transport)?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&text)
                .map(|body| body.message)
                .unwrap_or(text);
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        Ok(self.send_with_meta(builder).await?.0)
    }

    async fn send_with_meta<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<(T, Option<Meta>), ClientError> {
        let body = self.envelope::<T>(builder).await?;
        let data = body
            .data
            .ok_or_else(|| ClientError::Decode("response without data".to_string()))?;
        Ok((data, body.meta))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn signup(&self, payload: &SignupRequest) -> Result<AuthSession, ClientError> {
        self.post("/auth/signup", payload).await
    }

    pub async fn login(&self, payload: &LoginRequest) -> Result<AuthSession, ClientError> {
        self.post("/auth/login", payload).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        self.post(
            "/auth/refresh",
            &RefreshRequest {
                refresh_token: refresh_token.to_string(),
            },
        )
        .await
    }

    pub async fn me(&self) -> Result<MeResponse, ClientError> {
        self.send(self.request(Method::GET, "/auth/me")).await
    }

    pub async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage, ClientError> {
        if self.use_dummy_data {
            return Ok(fixture_page(query));
        }
        let builder = self.request(Method::GET, "/products").query(query);
        match self.send_with_meta::<Vec<ProductDetail>>(builder).await {
            Ok((items, meta)) => Ok(ProductPage {
                items,
                meta,
                from_fixtures: false,
            }),
            Err(ClientError::Transport(err)) => {
                tracing::warn!(error = %err, "API unavailable, serving built-in catalog");
                Ok(fixture_page(query))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get_product(&self, id: Uuid) -> Result<ProductDetail, ClientError> {
        if self.use_dummy_data {
            return fixture_product(id);
        }
        match self
            .send(self.request(Method::GET, &format!("/products/{id}")))
            .await
        {
            Err(ClientError::Transport(err)) => {
                tracing::warn!(error = %err, product_id = %id, "API unavailable, serving built-in product");
                fixture_product(id)
            }
            Err(ClientError::Api { status: 404, .. }) => Err(ClientError::NotFound(format!("Product {id}"))),
            other => other,
        }
    }

    pub async fn create_order(&self, payload: &CreateOrderRequest) -> Result<CreatedOrder, ClientError> {
        self.post("/orders", payload).await
    }

    pub async fn list_orders(
        &self,
        query: &OrderListQuery,
    ) -> Result<(Vec<OrderDetail>, Option<Meta>), ClientError> {
        self.send_with_meta(self.request(Method::GET, "/orders").query(query))
            .await
    }

    pub async fn get_order(&self, id: Uuid) -> Result<OrderDetail, ClientError> {
        self.send(self.request(Method::GET, &format!("/orders/{id}")))
            .await
    }

    pub async fn verify_payment(&self, order_id: Uuid) -> Result<OrderDetail, ClientError> {
        self.send(self.request(Method::POST, &format!("/orders/{order_id}/verify-payment")))
            .await
    }

    pub async fn track_event(&self, event: &CreateEventRequest) -> Result<EventCreated, ClientError> {
        self.post("/events", event).await
    }
}

fn fixture_page(query: &ProductQuery) -> ProductPage {
    let (items, meta) = fixtures::query(query);
    ProductPage {
        items,
        meta: Some(meta),
        from_fixtures: true,
    }
}

fn fixture_product(id: Uuid) -> Result<ProductDetail, ClientError> {
    fixtures::product(id).ok_or_else(|| ClientError::NotFound(format!("Product {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::StatusCode,
        routing::{get, post},
    };
    use serde_json::json;

    // Nothing listens on port 1.
    const UNREACHABLE: &str = "http://127.0.0.1:1";

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn unreachable_api_serves_fixture_catalog() {
        let client = ApiClient::new(UNREACHABLE).unwrap();
        let page = client
            .list_products(&ProductQuery {
                category: Some("electronics".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.from_fixtures);
        assert_eq!(page.items.len(), 3);

        let product = client.get_product(Uuid::from_u128(5)).await.unwrap();
        assert_eq!(product.product.sku, "IPHONE15PRO");

        let missing = client.get_product(Uuid::from_u128(999)).await.unwrap_err();
        assert!(matches!(missing, ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn dummy_data_mode_skips_the_network() {
        let client = ApiClient::new(UNREACHABLE).unwrap().with_dummy_data(true);
        let page = client.list_products(&ProductQuery::default()).await.unwrap();
        assert!(page.from_fixtures);
        assert_eq!(page.meta.unwrap().total, Some(9));
    }

    #[tokio::test]
    async fn non_product_calls_do_not_fall_back() {
        let client = ApiClient::new(UNREACHABLE).unwrap();
        let err = client.me().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(err.user_message(), "Service unavailable, try again later");
    }

    #[tokio::test]
    async fn error_envelope_becomes_api_error() {
        let app = Router::new().route(
            "/api/auth/login",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({
                        "success": false,
                        "message": "Invalid credentials",
                        "data": { "error": "Invalid credentials" },
                        "meta": null
                    })),
                )
            }),
        );
        let client = ApiClient::new(serve(app).await).unwrap();
        let err = client
            .login(&LoginRequest {
                email: "john@example.com".into(),
                password: "wrong-password".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.user_message(), "Invalid credentials");
    }

    #[tokio::test]
    async fn reads_data_and_meta_from_envelope() {
        let products = fixtures::products();
        let body = json!({
            "success": true,
            "message": "Products",
            "data": products[..2],
            "meta": { "page": 1, "per_page": 2, "total": 9 }
        });
        let app = Router::new().route(
            "/api/products",
            get(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        );
        let client = ApiClient::new(serve(app).await).unwrap();
        let page = client.list_products(&ProductQuery::default()).await.unwrap();
        assert!(!page.from_fixtures);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.meta, Some(Meta::new(1, 2, 9)));
    }
}
