use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use braid_llm::ChatRequest;
use braid_persist::timestamp::now_iso;
use braid_persist::{Message, MessageRole, MessageStatus, ThreadStatus};

use crate::account::authenticate;
use crate::assembler::build_conversation;
use crate::error::{ApiError, ApiResult};
use crate::relay::sink::DebouncedWriter;
use crate::relay::{drive_relay, RelayOutcome};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct PromptRequest {
    pub thread: Option<String>,
    #[validate(length(min = 1, message = "model must not be empty"))]
    pub model: String,
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
}

/// Admit a chat turn into the relay pipeline.
///
/// All gate checks (session, payload, thread ownership, quota) run before
/// anything is written. On success the paired user + assistant placeholder
/// messages are recorded, the upstream stream is opened, and the relay is
/// detached; the response returns the thread id without waiting for any
/// streaming to happen.
pub async fn prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    // Session first: an unauthenticated caller gets a 401 no matter what
    // the body holds
    let user = authenticate(&state, &headers).await?;

    let req: PromptRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;
    req.validate().map_err(ApiError::Validation)?;

    let existing = match &req.thread {
        Some(raw) => {
            let id = ObjectId::from_str(raw)
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
            Some(thread)
        }
        None => None,
    };

    let plan = state
        .billing
        .subscription_state(&user.id)
        .await
        .map_err(|e| {
            tracing::error!("Subscription lookup failed: {}", e);
            ApiError::Internal
        })?;
    let ceiling = if plan.subscribed {
        state.config.quota.pro_limit
    } else {
        state.config.quota.free_limit
    };

    let usage = state
        .persist
        .usage()
        .assistant_counts(&user.id, user.created_at)
        .await?;
    if usage.total >= ceiling {
        return Err(ApiError::QuotaExceeded);
    }

    let thread = match existing {
        Some(thread) => {
            state
                .persist
                .threads()
                .set_status(thread.id, ThreadStatus::Processing)
                .await?;
            thread
        }
        None => {
            state
                .persist
                .threads()
                .create_thread(&user.id, None, None)
                .await?
        }
    };

    // History is read before the new turn is recorded; the fresh user
    // message is appended by the assembler itself
    let history = state.persist.messages().history(thread.id).await?;
    let conversation = build_conversation(&user.profile, &history, &req.message);

    let user_message = Message {
        id: ObjectId::new(),
        thread_id: thread.id,
        user_id: user.id.clone(),
        role: MessageRole::User,
        content: req.message.clone(),
        created_at: now_iso(),
        status: MessageStatus::Finished,
        model: None,
        tokens: None,
        premium: None,
    };
    state.persist.append_message(&user_message).await?;

    let assistant_message = Message {
        id: ObjectId::new(),
        thread_id: thread.id,
        user_id: user.id.clone(),
        role: MessageRole::Assistant,
        content: String::new(),
        created_at: now_iso(),
        status: MessageStatus::Processing,
        model: Some(req.model.clone()),
        tokens: None,
        premium: None,
    };
    state.persist.append_message(&assistant_message).await?;

    // Open the upstream connection while the caller is still waiting:
    // a provider that cannot be reached is a gate-level error, while
    // everything after the headers is the detached relay's problem
    let request = ChatRequest::new(req.model.clone(), conversation);
    let events = state
        .completions
        .chat_stream(request)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let persist = Arc::clone(&state.persist);
    let debounce = Duration::from_millis(state.config.relay.debounce_ms);
    let idle_timeout = Duration::from_secs(state.config.relay.idle_timeout_secs);
    let thread_id = thread.id;
    let assistant_id = assistant_message.id;

    tokio::spawn(async move {
        let store = Arc::new(persist.messages().clone());
        let sink = DebouncedWriter::new(store, assistant_id, debounce);

        let outcome = drive_relay(events, &sink, idle_timeout).await;

        if let RelayOutcome::Completed { .. } = outcome {
            if let Err(e) = persist
                .threads()
                .set_status(thread_id, ThreadStatus::Finished)
                .await
            {
                tracing::error!("Thread finalize failed: {}", e);
            }
        }
    });

    Ok(Json(json!({
        "success": true,
        "thread": thread.id.to_hex(),
    })))
}
