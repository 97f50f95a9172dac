use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use validator::Validate;

use braid_persist::PersistError;

use crate::account::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct BranchRequest {
    #[validate(length(min = 1, message = "thread must not be empty"))]
    pub thread: String,
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
}

/// Fork a thread at one of its messages.
pub async fn branch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let user = authenticate(&state, &headers).await?;

    let req: BranchRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;
    req.validate().map_err(ApiError::Validation)?;

    let thread_id = ObjectId::from_str(&req.thread)
        .map_err(|_| ApiError::NotFound("Thread not found.".to_string()))?;
    let message_id = ObjectId::from_str(&req.message)
        .map_err(|_| ApiError::NotFound("Message not found.".to_string()))?;

    let thread = state
        .persist
        .threads()
        .get_thread(thread_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Thread not found.".to_string()))?;

    if thread.user_id != user.id {
        return Err(ApiError::Forbidden(
            "User does not have access to thread.".to_string(),
        ));
    }

    let outcome = state
        .persist
        .brancher()
        .branch(thread_id, message_id)
        .await
        .map_err(|e| match e {
            PersistError::ThreadNotFound(_)
            | PersistError::MessageNotFound(_)
            | PersistError::MessageNotInThread { .. } => {
                ApiError::BadRequest("Error creating branch.".to_string())
            }
            other => ApiError::Persist(other),
        })?;

    Ok(Json(json!({
        "success": true,
        "branched": outcome.new_thread.to_hex(),
    })))
}
