use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use validator::Validate;

use crate::account::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ModifyRequest {
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
    #[validate(length(min = 1, message = "content must not be empty"))]
    pub content: String,
}

/// Rewrite a past message. Everything after it in the thread is archived, so
/// the conversation can be replayed from the edited turn.
pub async fn modify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let user = authenticate(&state, &headers).await?;

    let req: ModifyRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;
    req.validate().map_err(ApiError::Validation)?;

    let message_id = ObjectId::from_str(&req.message)
        .map_err(|_| ApiError::NotFound("Message not found.".to_string()))?;

    let message = state
        .persist
        .messages()
        .get_message(message_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Message not found.".to_string()))?;

    if message.user_id != user.id {
        return Err(ApiError::Forbidden(
            "User does not have access to message.".to_string(),
        ));
    }

    let archived = state
        .persist
        .messages()
        .modify_message(message_id, &req.content)
        .await?;

    Ok(Json(json!({
        "success": true,
        "archived": archived,
    })))
}
