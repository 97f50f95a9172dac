use mongodb::bson::oid::ObjectId;

use crate::error::{PersistError, Result};
use crate::models::{Message, MessageStatus, Thread, ThreadStatus};
use crate::repositories::{MessageRepository, ThreadRepository};
use crate::timestamp::now_iso;

#[derive(Debug, Clone, Copy)]
pub struct BranchOutcome {
    pub new_thread: ObjectId,
    pub branched_message: ObjectId,
}

/// Forks a thread at a chosen message: the prefix up to and including that
/// message is cloned into a fresh thread, and the branch point in the source
/// thread is marked `branched`. Messages after the branch point are left
/// untouched.
///
/// The clone runs without a transaction. A failure mid-way leaves a new
/// thread holding only part of the prefix and the source message unmarked.
#[derive(Clone)]
pub struct ThreadBrancher {
    threads: ThreadRepository,
    messages: MessageRepository,
}

impl ThreadBrancher {
    pub fn new(threads: ThreadRepository, messages: MessageRepository) -> Self {
        Self { threads, messages }
    }

    pub async fn branch(
        &self,
        source_thread: ObjectId,
        branch_message: ObjectId,
    ) -> Result<BranchOutcome> {
        let source = self
            .threads
            .get_thread(source_thread)
            .await?
            .ok_or_else(|| PersistError::ThreadNotFound(source_thread.to_hex()))?;

        let branch_point = self
            .messages
            .get_message(branch_message)
            .await?
            .ok_or_else(|| PersistError::MessageNotFound(branch_message.to_hex()))?;

        if branch_point.thread_id != source_thread {
            return Err(PersistError::MessageNotInThread {
                message: branch_message.to_hex(),
                thread: source_thread.to_hex(),
            });
        }

        let now = now_iso();
        let description = match source.description.as_deref() {
            Some(d) => format!("Branch of {}", d),
            None => format!("Branch of thread {}", source_thread.to_hex()),
        };

        let source_messages = self.messages.get_messages(source_thread).await?;
        let new_thread_id = ObjectId::new();
        let clones = clone_prefix(source_messages, &branch_point, new_thread_id);

        // The clone keeps original timestamps, so the new thread's activity
        // marker is the newest cloned turn rather than the branch instant.
        let last_message_at = clones
            .iter()
            .map(|m| m.created_at.clone())
            .max()
            .unwrap_or_else(|| now.clone());

        let new_thread = Thread {
            id: new_thread_id,
            user_id: source.user_id.clone(),
            description: Some(description),
            created_at: now.clone(),
            updated_at: now,
            last_message_at,
            status: ThreadStatus::Processing,
            parent_thread: Some(source_thread),
        };

        self.threads.insert_thread(&new_thread).await?;
        self.messages.insert_messages(&clones).await?;
        self.messages
            .set_status(branch_message, MessageStatus::Branched)
            .await?;

        tracing::info!(
            source = %source_thread.to_hex(),
            branch = %new_thread_id.to_hex(),
            cloned = clones.len(),
            "Thread branched"
        );

        Ok(BranchOutcome {
            new_thread: new_thread_id,
            branched_message: branch_message,
        })
    }
}

/// Clone every message created at or before the branch point into the new
/// thread. Record identifiers are reassigned; roles, content, statuses and
/// original timestamps are preserved.
fn clone_prefix(
    source_messages: Vec<Message>,
    branch_point: &Message,
    new_thread: ObjectId,
) -> Vec<Message> {
    source_messages
        .into_iter()
        .filter(|m| m.created_at.as_str() <= branch_point.created_at.as_str())
        .map(|m| Message {
            id: ObjectId::new(),
            thread_id: new_thread,
            ..m
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    fn message(thread: ObjectId, created_at: &str, status: MessageStatus) -> Message {
        Message {
            id: ObjectId::new(),
            thread_id: thread,
            user_id: "u1".to_string(),
            role: MessageRole::User,
            content: format!("turn at {}", created_at),
            created_at: created_at.to_string(),
            status,
            model: None,
            tokens: None,
            premium: None,
        }
    }

    #[test]
    fn test_clone_prefix_is_inclusive() {
        let thread = ObjectId::new();
        let messages = vec![
            message(thread, "2024-03-01T10:00:00.000Z", MessageStatus::Finished),
            message(thread, "2024-03-01T10:01:00.000Z", MessageStatus::Finished),
            message(thread, "2024-03-01T10:02:00.000Z", MessageStatus::Finished),
        ];
        let branch_point = messages[1].clone();
        let new_thread = ObjectId::new();

        let clones = clone_prefix(messages, &branch_point, new_thread);

        assert_eq!(clones.len(), 2);
        assert_eq!(clones[0].created_at, "2024-03-01T10:00:00.000Z");
        assert_eq!(clones[1].created_at, "2024-03-01T10:01:00.000Z");
    }

    #[test]
    fn test_clone_prefix_reassigns_ids_and_thread() {
        let thread = ObjectId::new();
        let original = message(thread, "2024-03-01T10:00:00.000Z", MessageStatus::Branched);
        let original_id = original.id;
        let new_thread = ObjectId::new();

        let clones = clone_prefix(vec![original.clone()], &original, new_thread);

        assert_eq!(clones.len(), 1);
        assert_ne!(clones[0].id, original_id);
        assert_eq!(clones[0].thread_id, new_thread);
        // Everything else carries over untouched
        assert_eq!(clones[0].status, MessageStatus::Branched);
        assert_eq!(clones[0].role, original.role);
        assert_eq!(clones[0].content, original.content);
        assert_eq!(clones[0].created_at, original.created_at);
    }
}

