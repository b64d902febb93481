use serde_json::Value;
use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::events::{CreateEventRequest, EventCreated},
    error::{AppError, AppResult},
    response::{ApiResponse, Meta},
};

/// Event categories written by the API itself.
pub mod category {
    pub const AUTH: &str = "auth";
    pub const ORDER: &str = "order";
    pub const PAYMENT: &str = "payment";
}

pub async fn record_event(
    pool: &DbPool,
    name: &str,
    category: &str,
    payload: Value,
    user_id: Option<Uuid>,
    session_id: Option<&str>,
) -> AppResult<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO events (id, name, category, payload, user_id, session_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(category)
    .bind(payload)
    .bind(user_id)
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Record a server-side domain event; failures are logged, never returned.
pub async fn record_domain_event(
    pool: &DbPool,
    name: &str,
    category: &str,
    user_id: Option<Uuid>,
    payload: Value,
) {
    if let Err(err) = record_event(pool, name, category, payload, user_id, None).await {
        tracing::warn!(error = %err, event = name, "event recording failed");
    }
}

pub fn validate_event(payload: &CreateEventRequest) -> AppResult<()> {
    if payload.name.trim().is_empty() || payload.category.trim().is_empty() {
        return Err(AppError::BadRequest(
            "name and category are required".into(),
        ));
    }
    Ok(())
}

pub async fn create_event(
    pool: &DbPool,
    payload: CreateEventRequest,
) -> AppResult<ApiResponse<EventCreated>> {
    validate_event(&payload)?;

    let CreateEventRequest {
        name,
        category,
        payload,
        user_id,
        session_id,
    } = payload;

    let id = record_event(
        pool,
        name.trim(),
        category.trim(),
        payload.unwrap_or_else(|| serde_json::json!({})),
        user_id,
        session_id.as_deref(),
    )
    .await?;

    Ok(ApiResponse::success(
        "Event recorded",
        EventCreated { id },
        Some(Meta::empty()),
    ))
}
