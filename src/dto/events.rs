use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Default)]
pub struct CreateEventRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[schema(value_type = Option<Object>)]
    pub payload: Option<Value>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventCreated {
    pub id: Uuid,
}
