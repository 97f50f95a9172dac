use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// One turn in a conversation. `content` is mutable while an assistant
/// response is still streaming; everything else is written once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub thread_id: ObjectId,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
    pub status: MessageStatus,
    pub model: Option<String>,
    pub tokens: Option<u32>,
    pub premium: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Processing,
    Finished,
    Failed,
    Archived,
    Branched,
    Shared,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Processing => "processing",
            MessageStatus::Finished => "finished",
            MessageStatus::Failed => "failed",
            MessageStatus::Archived => "archived",
            MessageStatus::Branched => "branched",
            MessageStatus::Shared => "shared",
        }
    }
}
