// OpenRouter-compatible client (HTTP direct, no SDK)

use std::pin::Pin;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::streaming::{parse_chat_sse_stream, StreamEvent};
use crate::traits::CompletionClient;
use crate::types::ChatRequest;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenRouterClient {
    /// Create a new client with an API key and the attribution headers the
    /// provider expects (`HTTP-Referer`, `X-Title`).
    pub fn new(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );
        headers.insert(
            "HTTP-Referer",
            HeaderValue::from_str(&referer.into()).context("Invalid referer header")?,
        );
        headers.insert(
            "X-Title",
            HeaderValue::from_str(&title.into()).context("Invalid title header")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: OPENROUTER_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_chat_request(&self, request: &ChatRequest, stream: bool) -> Result<Value> {
        Ok(serde_json::json!({
            "model": &request.model,
            "messages": &request.messages,
            "temperature": request.options.temperature,
            "max_tokens": request.options.max_tokens,
            "top_p": request.options.top_p,
            "frequency_penalty": request.options.frequency_penalty,
            "presence_penalty": request.options.presence_penalty,
            "stream": stream,
        }))
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
        let payload = self.build_chat_request(&request, true)?;

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error ({}): {}", status, error_text);
        }

        Ok(parse_chat_sse_stream(response))
    }
}
