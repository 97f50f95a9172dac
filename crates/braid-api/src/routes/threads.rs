use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use braid_persist::{Message, MessageRole, MessageStatus, Thread, ThreadStatus};

use crate::account::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub id: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_message_at: String,
    pub status: ThreadStatus,
    pub parent_thread: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub thread: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
    pub status: MessageStatus,
    pub model: Option<String>,
    pub tokens: Option<u32>,
    pub premium: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ThreadListEntry {
    pub thread: ThreadResponse,
    pub oldest_message: Option<MessageResponse>,
}

#[derive(Debug, Serialize)]
pub struct ListThreadsResponse {
    pub threads: Vec<ThreadListEntry>,
}

#[derive(Debug, Serialize)]
pub struct ListMessagesResponse {
    pub messages: Vec<MessageResponse>,
}

/// The caller's threads, most recently active first, each with the opening
/// message for sidebar previews.
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListThreadsQuery>,
) -> ApiResult<Json<ListThreadsResponse>> {
    let user = authenticate(&state, &headers).await?;

    let limit = query.limit.clamp(1, 100);
    let threads = state
        .persist
        .threads()
        .list_threads(&user.id, limit, query.offset)
        .await?;

    let mut entries = Vec::with_capacity(threads.len());
    for thread in threads {
        let oldest = state.persist.messages().oldest_message(thread.id).await?;
        entries.push(ThreadListEntry {
            thread: thread_to_response(thread),
            oldest_message: oldest.map(message_to_response),
        });
    }

    Ok(Json(ListThreadsResponse { threads: entries }))
}

/// Full ascending message list of one of the caller's threads.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<ListMessagesResponse>> {
    let user = authenticate(&state, &headers).await?;

    let id = ObjectId::from_str(&thread_id)
        .map_err(|_| ApiError::NotFound("Thread not found.".to_string()))?;

    let thread = state
        .persist
        .threads()
        .get_thread(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Thread not found.".to_string()))?;

    if thread.user_id != user.id {
        return Err(ApiError::Forbidden(
            "User does not have access to thread.".to_string(),
        ));
    }

    let messages = state.persist.messages().get_messages(id).await?;

    Ok(Json(ListMessagesResponse {
        messages: messages.into_iter().map(message_to_response).collect(),
    }))
}

fn thread_to_response(thread: Thread) -> ThreadResponse {
    ThreadResponse {
        id: thread.id.to_hex(),
        description: thread.description,
        created_at: thread.created_at,
        updated_at: thread.updated_at,
        last_message_at: thread.last_message_at,
        status: thread.status,
        parent_thread: thread.parent_thread.map(|id| id.to_hex()),
    }
}

fn message_to_response(message: Message) -> MessageResponse {
    MessageResponse {
        id: message.id.to_hex(),
        thread: message.thread_id.to_hex(),
        role: message.role,
        content: message.content,
        created_at: message.created_at,
        status: message.status,
        model: message.model,
        tokens: message.tokens,
        premium: message.premium,
    }
}
