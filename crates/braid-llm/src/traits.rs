use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;

use crate::streaming::StreamEvent;
use crate::types::ChatRequest;

/// Streaming completion provider.
///
/// The relay only ever consumes the streaming form; non-streaming completions
/// have no caller in this service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>>;
}
