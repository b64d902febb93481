//! Paystack transactions client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use std::time::Duration;

use super::{
    PROVIDER_TIMEOUT, PaymentError, PaymentInit, PaymentProvider, PaymentRequest, ensure_success,
    http_client,
};
use crate::models::{PaymentMethod, PaymentStatus};

const BASE_URL: &str = "https://api.paystack.co";

#[derive(Clone)]
pub struct PaystackClient {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl std::fmt::Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaystackClient")
            .field("secret_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    /// Minor units (kobo, cents).
    amount: i64,
    currency: &'a str,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
}

impl PaystackClient {
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

fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<T, PaymentError> {
    if !envelope.status {
        return Err(PaymentError::Api {
            status: 200,
            message: envelope.message,
        });
    }
    envelope
        .data
        .ok_or_else(|| PaymentError::Parse("missing data in paystack response".into()))
}

#[async_trait]
impl PaymentProvider for PaystackClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn initialize(&self, request: &PaymentRequest) -> Result<PaymentInit, PaymentError> {
        let body = InitializeBody {
            email: &request.email,
            amount: request.amount_cents,
            currency: &request.currency,
            reference: request.order_id.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;

        let envelope: Envelope<InitializeData> = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;
        let data = unwrap_envelope(envelope)?;

        tracing::debug!(reference = %data.reference, "paystack transaction initialized");

        Ok(PaymentInit {
            provider: PaymentMethod::Paystack,
            reference: data.reference,
            client_secret: None,
            authorization_url: Some(data.authorization_url),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn verify(&self, reference: &str) -> Result<PaymentStatus, PaymentError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let envelope: Envelope<VerifyData> = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;
        let data = unwrap_envelope(envelope)?;

        Ok(transaction_status(&data.status))
    }
}

fn transaction_status(status: &str) -> PaymentStatus {
    match status {
        "success" => PaymentStatus::Completed,
        "failed" | "abandoned" | "reversed" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode, header},
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use uuid::Uuid;

    use super::*;

    const KEY: &str = "sk_test_paystack";

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

    #[tokio::test]
    async fn initialize_posts_json_and_returns_checkout_url() {
        let app = Router::new().route(
            "/transaction/initialize",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                if !bearer_ok(&headers) {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                assert_eq!(body["email"], "buyer@example.com");
                assert_eq!(body["amount"], 3999);
                assert_eq!(body["currency"], "NGN");
                Ok(Json(json!({
                    "status": true,
                    "message": "Authorization URL created",
                    "data": {
                        "authorization_url": "https://checkout.paystack.com/abc",
                        "access_code": "abc",
                        "reference": body["reference"]
                    }
                })))
            }),
        );
        let base = serve(app).await;
        let client = PaystackClient::with_base_url(KEY.into(), base).unwrap();

        let order_id = Uuid::new_v4();
        let init = client
            .initialize(&PaymentRequest {
                order_id,
                user_id: Uuid::new_v4(),
                email: "buyer@example.com".into(),
                amount_cents: 3999,
                currency: "NGN".into(),
            })
            .await
            .unwrap();
        assert_eq!(init.provider, PaymentMethod::Paystack);
        assert_eq!(init.reference, order_id.to_string());
        assert_eq!(
            init.authorization_url.as_deref(),
            Some("https://checkout.paystack.com/abc")
        );
        assert!(init.client_secret.is_none());
    }

    #[tokio::test]
    async fn verify_reads_transaction_status() {
        let app = Router::new().route(
            "/transaction/verify/{reference}",
            get(|Path(reference): Path<String>, headers: HeaderMap| async move {
                if !bearer_ok(&headers) {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                let body = match reference.as_str() {
                    "paid" => json!({ "status": true, "message": "ok", "data": { "status": "success" } }),
                    "waiting" => json!({ "status": true, "message": "ok", "data": { "status": "ongoing" } }),
                    _ => json!({ "status": false, "message": "Transaction reference not found", "data": null }),
                };
                Ok(Json(body))
            }),
        );
        let base = serve(app).await;
        let client = PaystackClient::with_base_url(KEY.into(), base).unwrap();

        assert_eq!(client.verify("paid").await.unwrap(), PaymentStatus::Completed);
        assert_eq!(client.verify("waiting").await.unwrap(), PaymentStatus::Pending);
        let err = client.verify("unknown").await.unwrap_err();
        assert!(matches!(err, PaymentError::Api { message, .. } if message.contains("not found")));
    }

    #[tokio::test]
    async fn wrong_key_is_an_api_error() {
        let app = Router::new().route(
            "/transaction/verify/{reference}",
            get(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "status": false, "message": "Invalid key" })),
                )
            }),
        );
        let base = serve(app).await;
        let client = PaystackClient::with_base_url("sk_wrong".into(), base).unwrap();
        let err = client.verify("paid").await.unwrap_err();
        assert!(matches!(err, PaymentError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let app = Router::new().route(
            "/transaction/verify/{reference}",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(Value::Null)
            }),
        );
        let base = serve(app).await;
        let client = PaystackClient::with_base_url(KEY.into(), base)
            .unwrap()
            .with_timeout(Duration::from_millis(100))
            .unwrap();
        let err = client.verify("slow").await.unwrap_err();
        assert!(matches!(err, PaymentError::Http(e) if e.is_timeout()));
    }

    #[test]
    fn maps_transaction_statuses() {
        assert_eq!(transaction_status("success"), PaymentStatus::Completed);
        assert_eq!(transaction_status("abandoned"), PaymentStatus::Failed);
        assert_eq!(transaction_status("reversed"), PaymentStatus::Failed);
        assert_eq!(transaction_status("ongoing"), PaymentStatus::Pending);
    }

    #[test]
    fn rejected_envelope_is_an_api_error() {
        let envelope: Envelope<VerifyData> = serde_json::from_str(
            r#"{"status": false, "message": "Transaction reference not found", "data": null}"#,
        )
        .unwrap();
        let err = unwrap_envelope(envelope).unwrap_err();
        assert!(matches!(err, PaymentError::Api { message, .. } if message.contains("not found")));
    }

    #[test]
    fn initialize_body_uses_minor_units() {
        let body = InitializeBody {
            email: "buyer@example.com",
            amount: 99900,
            currency: "USD",
            reference: "ref".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["amount"], 99900);
    }
}
