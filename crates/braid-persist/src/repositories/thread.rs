use mongodb::bson::oid::ObjectId;
use mongodb::{bson::doc, Client, Collection};

use futures::TryStreamExt;

use crate::error::Result;
use crate::models::{Thread, ThreadStatus};
use crate::timestamp::now_iso;

#[derive(Clone)]
pub struct ThreadRepository {
    collection: Collection<Thread>,
}

impl ThreadRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("threads");
        Self { collection }
    }

    /// Create a new thread owned by `user_id`.
    pub async fn create_thread(
        &self,
        user_id: &str,
        description: Option<String>,
        parent_thread: Option<ObjectId>,
    ) -> Result<Thread> {
        let now = now_iso();
        let thread = Thread {
            id: ObjectId::new(),
            user_id: user_id.to_string(),
            description,
            created_at: now.clone(),
            updated_at: now.clone(),
            last_message_at: now,
            status: ThreadStatus::Processing,
            parent_thread,
        };

        self.collection.insert_one(&thread).await?;
        Ok(thread)
    }

    /// Insert a fully prepared thread record (used by the branch operator,
    /// which controls the timestamps itself).
    pub async fn insert_thread(&self, thread: &Thread) -> Result<ObjectId> {
        self.collection.insert_one(thread).await?;
        Ok(thread.id)
    }

    pub async fn get_thread(&self, thread_id: ObjectId) -> Result<Option<Thread>> {
        let filter = doc! { "_id": thread_id };
        Ok(self.collection.find_one(filter).await?)
    }

    pub async fn set_status(&self, thread_id: ObjectId, status: ThreadStatus) -> Result<()> {
        let filter = doc! { "_id": thread_id };
        let update = doc! {
            "$set": { "status": status.as_str(), "updated_at": now_iso() }
        };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }

    /// Refresh `last_message_at` (and `updated_at`) after a message insert.
    /// `$max` keeps the field monotonic when an older timestamp is replayed.
    pub async fn touch_last_message(&self, thread_id: ObjectId, at: &str) -> Result<()> {
        let filter = doc! { "_id": thread_id };
        let update = doc! {
            "$max": { "last_message_at": at },
            "$set": { "updated_at": now_iso() },
        };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }

    /// List a user's threads, most recently active first.
    pub async fn list_threads(
        &self,
        user_id: &str,
        limit: i64,
        offset: u64,
    ) -> Result<Vec<Thread>> {
        let filter = doc! { "user_id": user_id };
        let threads = self
            .collection
            .find(filter)
            .sort(doc! { "last_message_at": -1 })
            .skip(offset)
            .limit(limit)
            .await?
            .try_collect()
            .await?;
        Ok(threads)
    }
}
