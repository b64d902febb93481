//! Stripe PaymentIntents client.

use async_trait::async_trait;
use serde::Deserialize;

use std::time::Duration;

use super::{
    PROVIDER_TIMEOUT, PaymentError, PaymentInit, PaymentProvider, PaymentRequest, ensure_success,
    http_client,
};
use crate::models::{PaymentMethod, PaymentStatus};

const BASE_URL: &str = "https://api.stripe.com/v1";

#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    client_secret: Option<String>,
    status: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Result<Self, PaymentError> {
        Self::with_base_url(secret_key, BASE_URL)
    }

    pub fn with_base_url(
        secret_key: String,
        base_url: impl Into<String>,
    ) -> Result<Self, PaymentError> {
        Ok(Self {
            client: http_client(PROVIDER_TIMEOUT)?,
            secret_key,
            base_url: base_url.into(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, PaymentError> {
        self.client = http_client(timeout)?;
        Ok(self)
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn initialize(&self, request: &PaymentRequest) -> Result<PaymentInit, PaymentError> {
        let form = [
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("metadata[order_id]", request.order_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let intent: PaymentIntent = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;

        tracing::debug!(intent_id = %intent.id, "stripe payment intent created");

        Ok(PaymentInit {
            provider: PaymentMethod::Stripe,
            reference: intent.id,
            client_secret: intent.client_secret,
            authorization_url: None,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn verify(&self, reference: &str) -> Result<PaymentStatus, PaymentError> {
        let response = self
            .client
            .get(format!("{}/payment_intents/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let intent: PaymentIntent = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;

        Ok(intent_status(&intent.status))
    }
}

fn intent_status(status: &str) -> PaymentStatus {
    match status {
        "succeeded" => PaymentStatus::Completed,
        "canceled" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        Form, Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode, header},
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use uuid::Uuid;

    use super::*;

    const KEY: &str = "sk_test_123";

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn bearer_ok(headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {KEY}"))
    }

    fn request(order_id: Uuid) -> PaymentRequest {
        PaymentRequest {
            order_id,
            user_id: Uuid::from_u128(7),
            email: "buyer@example.com".into(),
            amount_cents: 103899,
            currency: "USD".into(),
        }
    }

    #[tokio::test]
    async fn creates_intent_with_form_fields() {
        let app = Router::new().route(
            "/payment_intents",
            post(
                |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                    if !bearer_ok(&headers) {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    assert_eq!(form["amount"], "103899");
                    assert_eq!(form["currency"], "usd");
                    assert_eq!(form["metadata[user_id]"], Uuid::from_u128(7).to_string());
                    Ok(Json(json!({
                        "id": format!("pi_{}", form["metadata[order_id]"]),
                        "client_secret": "pi_secret_abc",
                        "status": "requires_payment_method"
                    })))
                },
            ),
        );
        let base = serve(app).await;
        let client = StripeClient::with_base_url(KEY.into(), base).unwrap();

        let order_id = Uuid::new_v4();
        let init = client.initialize(&request(order_id)).await.unwrap();
        assert_eq!(init.provider, PaymentMethod::Stripe);
        assert_eq!(init.reference, format!("pi_{order_id}"));
        assert_eq!(init.client_secret.as_deref(), Some("pi_secret_abc"));
        assert!(init.authorization_url.is_none());
    }

    #[tokio::test]
    async fn verify_reads_intent_status() {
        let app = Router::new().route(
            "/payment_intents/{id}",
            get(|Path(id): Path<String>, headers: HeaderMap| async move {
                if !bearer_ok(&headers) {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                let status = if id == "pi_paid" { "succeeded" } else { "canceled" };
                Ok(Json(json!({ "id": id, "client_secret": null, "status": status })))
            }),
        );
        let base = serve(app).await;
        let client = StripeClient::with_base_url(KEY.into(), base).unwrap();

        assert_eq!(client.verify("pi_paid").await.unwrap(), PaymentStatus::Completed);
        assert_eq!(client.verify("pi_other").await.unwrap(), PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn error_status_becomes_api_error() {
        let app = Router::new().route(
            "/payment_intents",
            post(|| async {
                (
                    StatusCode::PAYMENT_REQUIRED,
                    Json(json!({ "error": { "message": "Your card was declined." } })),
                )
            }),
        );
        let base = serve(app).await;
        let client = StripeClient::with_base_url("sk_bad".into(), base).unwrap();

        let err = client.initialize(&request(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Api { status: 402, message } if message.contains("declined")
        ));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let app = Router::new().route(
            "/payment_intents/{id}",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(Value::Null)
            }),
        );
        let base = serve(app).await;
        let client = StripeClient::with_base_url(KEY.into(), base)
            .unwrap()
            .with_timeout(Duration::from_millis(100))
            .unwrap();

        let err = client.verify("pi_slow").await.unwrap_err();
        assert!(matches!(err, PaymentError::Http(e) if e.is_timeout()));
    }

    #[test]
    fn maps_intent_statuses() {
        assert_eq!(intent_status("succeeded"), PaymentStatus::Completed);
        assert_eq!(intent_status("canceled"), PaymentStatus::Failed);
        assert_eq!(intent_status("requires_payment_method"), PaymentStatus::Pending);
        assert_eq!(intent_status("processing"), PaymentStatus::Pending);
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let client = StripeClient::new("sk_test_123".into()).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk_test_123"));
    }
}
