//! Boundary to the account service that owns users, sessions and billing in
//! the relational store. This crate never reads those tables itself; it
//! resolves an opaque session token into an identity and asks for the
//! caller's subscription state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Profile customization a user has saved; folded into the system prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub nickname: String,
    pub occupation: String,
    pub traits: Vec<String>,
    pub additional_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthedUser {
    pub id: String,
    pub email: String,
    /// Account creation instant; anchors the rolling usage window
    pub created_at: DateTime<Utc>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscribed: bool,
}

#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Resolve an opaque session token; `None` means no valid session.
    async fn validate(&self, token: &str) -> Result<Option<AuthedUser>>;
}

#[async_trait]
pub trait BillingLedger: Send + Sync {
    async fn subscription_state(&self, user_id: &str) -> Result<SubscriptionState>;
}

pub struct AccountServiceClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl AccountServiceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SessionValidator for AccountServiceClient {
    async fn validate(&self, token: &str) -> Result<Option<AuthedUser>> {
        let response = self
            .http_client
            .get(format!("{}/sessions/{}", self.base_url, token))
            .send()
            .await
            .context("Failed to reach account service")?;

        match response.status() {
            status if status.is_success() => {
                let user = response
                    .json::<AuthedUser>()
                    .await
                    .context("Failed to parse session response")?;
                Ok(Some(user))
            }
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::UNAUTHORIZED => Ok(None),
            status => anyhow::bail!("Account service error ({})", status),
        }
    }
}

#[async_trait]
impl BillingLedger for AccountServiceClient {
    async fn subscription_state(&self, user_id: &str) -> Result<SubscriptionState> {
        let response = self
            .http_client
            .get(format!("{}/users/{}/subscription", self.base_url, user_id))
            .send()
            .await
            .context("Failed to reach account service")?;

        if !response.status().is_success() {
            anyhow::bail!("Account service error ({})", response.status());
        }

        response
            .json::<SubscriptionState>()
            .await
            .context("Failed to parse subscription response")
    }
}

/// Extract the session token from a `Bearer` authorization header or the
/// `session` cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == "session" && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

/// Resolve the caller's identity or fail the request with a 401.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthedUser, ApiError> {
    let token = session_token(headers).ok_or(ApiError::Unauthenticated)?;

    match state.sessions.validate(&token).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(ApiError::Unauthenticated),
        Err(e) => {
            tracing::error!("Session validation failed: {}", e);
            Err(ApiError::Unauthenticated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_token_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );

        assert_eq!(session_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn test_session_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=tok-42; lang=en"),
        );

        assert_eq!(session_token(&headers), Some("tok-42".to_string()));
    }

    #[test]
    fn test_session_token_missing() {
        let headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_token(&headers), None);
    }
}
