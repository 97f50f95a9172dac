use mongodb::bson::oid::ObjectId;
use mongodb::Client;

use crate::branch::ThreadBrancher;
use crate::error::{PersistError, Result};
use crate::models::Message;
use crate::repositories::{MessageRepository, ThreadRepository};
use crate::usage::UsageCounter;

/// Entry point to the document store: owns the thread and message
/// repositories plus the components composed from them.
pub struct PersistClient {
    thread_repo: ThreadRepository,
    message_repo: MessageRepository,
    usage: UsageCounter,
    brancher: ThreadBrancher,
}

impl PersistClient {
    pub async fn new(mongodb_uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        let thread_repo = ThreadRepository::new(&client, db_name);
        let message_repo = MessageRepository::new(&client, db_name);
        let usage = UsageCounter::new(message_repo.clone());
        let brancher = ThreadBrancher::new(thread_repo.clone(), message_repo.clone());

        Ok(Self {
            thread_repo,
            message_repo,
            usage,
            brancher,
        })
    }

    pub fn threads(&self) -> &ThreadRepository {
        &self.thread_repo
    }

    pub fn messages(&self) -> &MessageRepository {
        &self.message_repo
    }

    pub fn usage(&self) -> &UsageCounter {
        &self.usage
    }

    pub fn brancher(&self) -> &ThreadBrancher {
        &self.brancher
    }

    /// Insert a message and refresh the owning thread's activity marker in
    /// one place, so `last_message_at` tracks every insert.
    pub async fn append_message(&self, message: &Message) -> Result<ObjectId> {
        let id = self.message_repo.insert_message(message).await?;
        self.thread_repo
            .touch_last_message(message.thread_id, &message.created_at)
            .await?;
        Ok(id)
    }
}
