//! Payment provider integration.
//!
//! Providers are reached over their HTTP APIs and hidden behind the
//! [`PaymentProvider`] trait. The [`PaymentGateway`] holds one client per
//! configured [`PaymentMethod`].

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    models::{PaymentMethod, PaymentStatus},
};

pub mod paystack;
pub mod stripe;

pub use paystack::PaystackClient;
pub use stripe::StripeClient;

/// Provider calls run while order and inventory rows are locked, so they
/// must not wait forever.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, PaymentError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

#[derive(Debug, Error)]
pub enum PaymentError {
    /// No secret key was configured for the provider.
    #[error("{0} payments are not configured")]
    NotConfigured(PaymentMethod),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// What a provider needs to open a payment for an order.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub amount_cents: i64,
    pub currency: String,
}

/// Client-facing result of initializing a payment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct PaymentInit {
    pub provider: PaymentMethod,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn initialize(&self, request: &PaymentRequest) -> Result<PaymentInit, PaymentError>;

    async fn verify(&self, reference: &str) -> Result<PaymentStatus, PaymentError>;
}

#[derive(Clone, Default)]
pub struct PaymentGateway {
    providers: HashMap<PaymentMethod, Arc<dyn PaymentProvider>>,
}

impl fmt::Debug for PaymentGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentGateway")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client for every provider that has a secret key.
    pub fn from_config(config: &AppConfig) -> Result<Self, PaymentError> {
        let mut gateway = Self::new();
        if let Some(secret) = &config.stripe_secret {
            gateway = gateway.with_provider(
                PaymentMethod::Stripe,
                Arc::new(StripeClient::new(secret.clone())?),
            );
        } else {
            tracing::warn!("STRIPE_SECRET_KEY not set, stripe payments disabled");
        }
        if let Some(secret) = &config.paystack_secret {
            gateway = gateway.with_provider(
                PaymentMethod::Paystack,
                Arc::new(PaystackClient::new(secret.clone())?),
            );
        } else {
            tracing::warn!("PAYSTACK_SECRET_KEY not set, paystack payments disabled");
        }
        Ok(gateway)
    }

    pub fn with_provider(
        mut self,
        method: PaymentMethod,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        self.providers.insert(method, provider);
        self
    }

    pub fn provider(&self, method: PaymentMethod) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.providers
            .get(&method)
            .cloned()
            .ok_or(PaymentError::NotConfigured(method))
    }
}

/// Turn a non-success provider response into [`PaymentError::Api`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, PaymentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(PaymentError::Api {
        status: status.as_u16(),
        message,
    })
}
