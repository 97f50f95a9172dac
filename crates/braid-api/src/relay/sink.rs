//! Coalesces high-frequency content deltas into bounded-rate store writes.
//!
//! One sink exists per relay invocation. Each `push` publishes the latest
//! accumulator snapshot into a single pending slot; a lone worker task
//! sleeps the debounce delay, then drains the slot until no value remains
//! after its last completed write. Writes for a message therefore strictly
//! serialize, every written value is a snapshot the accumulator held, and
//! the final write (`finish`) happens-after the worker has drained.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use braid_persist::error::Result as PersistResult;
use braid_persist::{MessageRepository, MessageStatus};

/// Write surface the sink needs from the store.
#[async_trait]
pub trait MessageContentStore: Send + Sync + 'static {
    async fn write_content(
        &self,
        message: ObjectId,
        content: &str,
        status: MessageStatus,
    ) -> PersistResult<()>;
}

#[async_trait]
impl MessageContentStore for MessageRepository {
    async fn write_content(
        &self,
        message: ObjectId,
        content: &str,
        status: MessageStatus,
    ) -> PersistResult<()> {
        self.update_content(message, content, status).await
    }
}

struct SinkState {
    pending: Option<String>,
    worker_running: bool,
}

pub struct DebouncedWriter<S: MessageContentStore> {
    store: Arc<S>,
    message: ObjectId,
    delay: Duration,
    state: Arc<Mutex<SinkState>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: MessageContentStore> DebouncedWriter<S> {
    pub fn new(store: Arc<S>, message: ObjectId, delay: Duration) -> Self {
        Self {
            store,
            message,
            delay,
            state: Arc::new(Mutex::new(SinkState {
                pending: None,
                worker_running: false,
            })),
            worker: Mutex::new(None),
        }
    }

    /// Publish the latest accumulator snapshot. Snapshots arriving while a
    /// write is scheduled or in flight replace the previous pending value.
    pub async fn push(&self, snapshot: String) {
        let spawn_worker = {
            let mut state = self.state.lock().await;
            state.pending = Some(snapshot);
            if state.worker_running {
                false
            } else {
                state.worker_running = true;
                true
            }
        };

        if spawn_worker {
            let handle = tokio::spawn(Self::drain(
                Arc::clone(&self.store),
                self.message,
                self.delay,
                Arc::clone(&self.state),
            ));
            *self.worker.lock().await = Some(handle);
        }
    }

    async fn drain(
        store: Arc<S>,
        message: ObjectId,
        delay: Duration,
        state: Arc<Mutex<SinkState>>,
    ) {
        tokio::time::sleep(delay).await;

        loop {
            // Take the pending snapshot and decide liveness under one lock,
            // so a concurrent push either lands in this drain or spawns the
            // next worker, never neither
            let next = {
                let mut state = state.lock().await;
                match state.pending.take() {
                    Some(content) => Some(content),
                    None => {
                        state.worker_running = false;
                        None
                    }
                }
            };

            let Some(content) = next else { break };

            // Best-effort: a failed streaming write must not abort the relay
            if let Err(e) = store
                .write_content(message, &content, MessageStatus::Processing)
                .await
            {
                tracing::error!("Streaming content write failed: {}", e);
            }
        }
    }

    async fn wait_for_worker(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Sink worker panicked: {}", e);
            }
        }
    }

    /// Final write: waits until the worker has drained, then persists the
    /// full content with the terminal status. Called exactly once per relay.
    pub async fn finish(&self, content: String, status: MessageStatus) -> PersistResult<()> {
        self.wait_for_worker().await;
        self.store
            .write_content(self.message, &content, status)
            .await
    }

    /// Stop without a terminal write, leaving the message in whatever status
    /// the last drained write gave it.
    pub async fn close(&self) {
        self.wait_for_worker().await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub writes: std::sync::Mutex<Vec<(String, MessageStatus)>>,
    }

    #[async_trait]
    impl MessageContentStore for RecordingStore {
        async fn write_content(
            &self,
            _message: ObjectId,
            content: &str,
            status: MessageStatus,
        ) -> PersistResult<()> {
            self.writes
                .lock()
                .unwrap()
                .push((content.to_string(), status));
            Ok(())
        }
    }

    fn writer(store: &Arc<RecordingStore>, delay_ms: u64) -> DebouncedWriter<RecordingStore> {
        DebouncedWriter::new(Arc::clone(store), ObjectId::new(), Duration::from_millis(delay_ms))
    }

    #[tokio::test]
    async fn test_rapid_deltas_coalesce_into_one_write() {
        let store = Arc::new(RecordingStore::default());
        let sink = writer(&store, 50);

        sink.push("a".to_string()).await;
        sink.push("ab".to_string()).await;
        sink.push("abc".to_string()).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(writes, vec![("abc".to_string(), MessageStatus::Processing)]);
    }

    #[tokio::test]
    async fn test_finish_writes_full_content_last() {
        let store = Arc::new(RecordingStore::default());
        let sink = writer(&store, 10);

        sink.push("hel".to_string()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        sink.push("hello wor".to_string()).await;
        sink.finish("hello world".to_string(), MessageStatus::Finished)
            .await
            .unwrap();

        let writes = store.writes.lock().unwrap().clone();

        // Content lengths never shrink and the final write is terminal
        for pair in writes.windows(2) {
            assert!(pair[0].0.len() <= pair[1].0.len());
        }
        assert_eq!(
            writes.last(),
            Some(&("hello world".to_string(), MessageStatus::Finished))
        );
        assert_eq!(
            writes
                .iter()
                .filter(|(_, s)| *s == MessageStatus::Finished)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_finish_without_any_delta() {
        let store = Arc::new(RecordingStore::default());
        let sink = writer(&store, 10);

        sink.finish(String::new(), MessageStatus::Finished)
            .await
            .unwrap();

        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(writes, vec![(String::new(), MessageStatus::Finished)]);
    }

    #[tokio::test]
    async fn test_close_leaves_no_terminal_write() {
        let store = Arc::new(RecordingStore::default());
        let sink = writer(&store, 10);

        sink.push("partial".to_string()).await;
        sink.close().await;

        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![("partial".to_string(), MessageStatus::Processing)]
        );
    }

    #[tokio::test]
    async fn test_every_write_is_a_snapshot_prefix() {
        let store = Arc::new(RecordingStore::default());
        let sink = writer(&store, 5);

        let mut content = String::new();
        for i in 0..40 {
            content.push_str(&format!("{} ", i));
            sink.push(content.clone()).await;
            if i % 7 == 0 {
                tokio::time::sleep(Duration::from_millis(12)).await;
            }
        }
        sink.finish(content.clone(), MessageStatus::Finished)
            .await
            .unwrap();

        let writes = store.writes.lock().unwrap().clone();
        for (written, _) in &writes {
            assert!(content.starts_with(written.as_str()));
        }
        assert_eq!(writes.last().map(|(c, _)| c.clone()), Some(content));
    }
}
