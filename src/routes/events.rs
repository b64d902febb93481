use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    dto::events::{CreateEventRequest, EventCreated},
    error::AppResult,
    middleware::json::AppJson,
    response::ApiResponse,
    services::event_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_event))
}

#[utoipa::path(
    post,
    path = "/api/events",
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Event recorded", body = ApiResponse<EventCreated>),
        (status = 400, description = "name and category are required")
    ),
    tag = "Events"
)]
pub async fn create_event(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<EventCreated>>)> {
    let resp = event_service::create_event(&state.pool, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}
