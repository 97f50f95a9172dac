use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: HashMap<String, String>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    let mut services = HashMap::new();

    match check_mongodb(&state).await {
        Ok(_) => services.insert("mongodb".to_string(), "connected".to_string()),
        Err(_) => services.insert("mongodb".to_string(), "disconnected".to_string()),
    };

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
    }))
}

async fn check_mongodb(state: &AppState) -> ApiResult<()> {
    // Lightweight read against a user id that never exists
    let _ = state
        .persist
        .threads()
        .list_threads("_health_check", 1, 0)
        .await?;
    Ok(())
}
