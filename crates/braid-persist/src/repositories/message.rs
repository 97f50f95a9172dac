use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::{bson::doc, Client, Collection};

use futures::TryStreamExt;

use crate::error::{PersistError, Result};
use crate::models::{Message, MessageRole, MessageStatus};
use crate::timestamp::{cmp_created_at, to_iso};

#[derive(Clone)]
pub struct MessageRepository {
    collection: Collection<Message>,
}

impl MessageRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("messages");
        Self { collection }
    }

    pub async fn insert_message(&self, message: &Message) -> Result<ObjectId> {
        self.collection.insert_one(message).await?;
        Ok(message.id)
    }

    /// Insert multiple messages (batch). Not transactional: a failure can
    /// leave a prefix of the batch persisted.
    pub async fn insert_messages(&self, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        self.collection.insert_many(messages).await?;
        Ok(())
    }

    pub async fn get_message(&self, message_id: ObjectId) -> Result<Option<Message>> {
        let filter = doc! { "_id": message_id };
        Ok(self.collection.find_one(filter).await?)
    }

    /// Overwrite a message's content and status (streaming writes).
    pub async fn update_content(
        &self,
        message_id: ObjectId,
        content: &str,
        status: MessageStatus,
    ) -> Result<()> {
        let filter = doc! { "_id": message_id };
        let update = doc! {
            "$set": { "content": content, "status": status.as_str() }
        };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }

    pub async fn set_status(&self, message_id: ObjectId, status: MessageStatus) -> Result<()> {
        let filter = doc! { "_id": message_id };
        let update = doc! { "$set": { "status": status.as_str() } };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }

    /// All messages of a thread, ascending by creation time.
    pub async fn get_messages(&self, thread_id: ObjectId) -> Result<Vec<Message>> {
        let filter = doc! { "thread_id": thread_id };
        let messages = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages)
    }

    /// Messages of a thread in one status, ascending by creation time.
    pub async fn get_messages_by_status(
        &self,
        thread_id: ObjectId,
        status: MessageStatus,
    ) -> Result<Vec<Message>> {
        let filter = doc! { "thread_id": thread_id, "status": status.as_str() };
        let messages = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages)
    }

    /// The conversation history sent upstream: `finished`, `branched` and
    /// `shared` turns combined, re-sorted ascending. `processing`, `failed`
    /// and `archived` messages never reach the model.
    pub async fn history(&self, thread_id: ObjectId) -> Result<Vec<Message>> {
        let mut combined = self
            .get_messages_by_status(thread_id, MessageStatus::Finished)
            .await?;
        combined.extend(
            self.get_messages_by_status(thread_id, MessageStatus::Branched)
                .await?,
        );
        combined.extend(
            self.get_messages_by_status(thread_id, MessageStatus::Shared)
                .await?,
        );

        Ok(sort_ascending(combined))
    }

    pub async fn oldest_message(&self, thread_id: ObjectId) -> Result<Option<Message>> {
        let filter = doc! { "thread_id": thread_id };
        Ok(self
            .collection
            .find_one(filter)
            .sort(doc! { "created_at": 1 })
            .await?)
    }

    /// Count a user's messages of one role within `[start, end)`, restricted
    /// to the given statuses. `premium_only` narrows to premium-flagged
    /// records.
    pub async fn count_in_window(
        &self,
        user_id: &str,
        role: MessageRole,
        statuses: &[MessageStatus],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        premium_only: bool,
    ) -> Result<u64> {
        let status_values: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let mut filter = doc! {
            "user_id": user_id,
            "role": role.as_str(),
            "status": { "$in": status_values },
            "created_at": { "$gte": to_iso(start), "$lt": to_iso(end) },
        };
        if premium_only {
            filter.insert("premium", true);
        }

        Ok(self.collection.count_documents(filter).await?)
    }

    /// Rewrite a message's content and archive every later message in the
    /// same thread, returning how many were archived. The edited message
    /// keeps its creation timestamp so its position in the thread is stable.
    pub async fn modify_message(&self, message_id: ObjectId, new_content: &str) -> Result<u64> {
        let original = self
            .get_message(message_id)
            .await?
            .ok_or_else(|| PersistError::MessageNotFound(message_id.to_hex()))?;

        let filter = doc! { "_id": message_id };
        let update = doc! { "$set": { "content": new_content } };
        self.collection.update_one(filter, update).await?;

        let subsequent = doc! {
            "thread_id": original.thread_id,
            "created_at": { "$gt": &original.created_at },
        };
        let archive = doc! { "$set": { "status": MessageStatus::Archived.as_str() } };
        let result = self.collection.update_many(subsequent, archive).await?;

        Ok(result.modified_count)
    }
}

/// Stable re-sort of combined status substreams. Unparseable timestamps
/// compare equal, so they keep their relative order instead of failing the
/// read.
fn sort_ascending(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by(|a, b| cmp_created_at(&a.created_at, &b.created_at));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(created_at: &str, content: &str) -> Message {
        Message {
            id: ObjectId::new(),
            thread_id: ObjectId::new(),
            user_id: "u1".to_string(),
            role: MessageRole::User,
            content: content.to_string(),
            created_at: created_at.to_string(),
            status: MessageStatus::Finished,
            model: None,
            tokens: None,
            premium: None,
        }
    }

    #[test]
    fn test_sort_ascending_by_creation_time() {
        let messages = vec![
            message("2024-03-01T10:02:00.000Z", "third"),
            message("2024-03-01T10:00:00.000Z", "first"),
            message("2024-03-01T10:01:00.000Z", "second"),
        ];

        let sorted = sort_ascending(messages);
        let contents: Vec<&str> = sorted.iter().map(|m| m.content.as_str()).collect();

        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_sort_tolerates_invalid_timestamps() {
        let messages = vec![
            message("not-a-timestamp", "corrupt"),
            message("2024-03-01T10:00:00.000Z", "valid"),
        ];

        // Must not panic; the corrupt record stays where the stable sort
        // leaves it
        let sorted = sort_ascending(messages);
        assert_eq!(sorted.len(), 2);
    }
}

