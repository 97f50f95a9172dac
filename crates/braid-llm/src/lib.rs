pub mod client;
pub mod streaming;
pub mod traits;
pub mod types;

pub use client::OpenRouterClient;
pub use streaming::{parse_chat_sse_stream, StreamEvent};
pub use traits::CompletionClient;
pub use types::{ChatMessage, ChatOptions, ChatRequest, ChatRole};
