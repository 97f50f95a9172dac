use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Conversation container. `last_message_at` is refreshed on every message
/// insert and never moves backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_message_at: String,
    pub status: ThreadStatus,
    pub parent_thread: Option<ObjectId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Processing,
    Finished,
    Archived,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Processing => "processing",
            ThreadStatus::Finished => "finished",
            ThreadStatus::Archived => "archived",
        }
    }
}
