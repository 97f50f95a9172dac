//! Drives an upstream completion stream to completion, feeding the debounced
//! sink as deltas arrive. Relays run detached from the request that started
//! them: the handler returns as soon as the stream is open, and everything
//! here reports through logs and the message's eventual state.

pub mod sink;

use std::time::Duration;

use futures::{Stream, StreamExt};

use braid_llm::StreamEvent;
use braid_persist::MessageStatus;

use self::sink::{DebouncedWriter, MessageContentStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream closed normally; the message was finalized `finished`.
    Completed { content: String },
    /// Upstream went silent past the idle timeout; the message was
    /// finalized `failed` with the partial content.
    TimedOut { content: String },
    /// The transport failed mid-stream; the message keeps its last-written
    /// status and whatever content had been flushed.
    TransportFailed { content: String },
}

pub async fn drive_relay<E, S>(
    mut events: E,
    sink: &DebouncedWriter<S>,
    idle_timeout: Duration,
) -> RelayOutcome
where
    E: Stream<Item = anyhow::Result<StreamEvent>> + Unpin + Send,
    S: MessageContentStore,
{
    let mut content = String::new();

    loop {
        match tokio::time::timeout(idle_timeout, events.next()).await {
            Err(_) => {
                tracing::warn!(
                    "Upstream silent for {}s, marking message failed",
                    idle_timeout.as_secs()
                );
                if let Err(e) = sink.finish(content.clone(), MessageStatus::Failed).await {
                    tracing::error!("Failed-state write failed: {}", e);
                }
                return RelayOutcome::TimedOut { content };
            }
            Ok(None) => break,
            Ok(Some(Ok(StreamEvent::Delta { content: delta }))) => {
                content.push_str(&delta);
                sink.push(content.clone()).await;
            }
            Ok(Some(Ok(StreamEvent::Done { .. }))) => break,
            Ok(Some(Err(e))) => {
                tracing::error!("Upstream stream failed mid-relay: {}", e);
                sink.close().await;
                return RelayOutcome::TransportFailed { content };
            }
        }
    }

    // Normal end of stream: flush and mark finished exactly once, even when
    // no delta ever arrived
    if let Err(e) = sink.finish(content.clone(), MessageStatus::Finished).await {
        tracing::error!("Final content write failed: {}", e);
    }

    RelayOutcome::Completed { content }
}

#[cfg(test)]
mod tests {
    use super::sink::tests::RecordingStore;
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use std::sync::Arc;

    fn delta(content: &str) -> anyhow::Result<StreamEvent> {
        Ok(StreamEvent::Delta {
            content: content.to_string(),
        })
    }

    fn sink_for(store: &Arc<RecordingStore>) -> DebouncedWriter<RecordingStore> {
        DebouncedWriter::new(Arc::clone(store), ObjectId::new(), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_relay_completes_and_finalizes() {
        let store = Arc::new(RecordingStore::default());
        let sink = sink_for(&store);
        let events = futures::stream::iter(vec![
            delta("Hel"),
            delta("lo"),
            Ok(StreamEvent::Done {
                finish_reason: Some("stop".to_string()),
            }),
        ]);

        let outcome = drive_relay(events, &sink, Duration::from_secs(5)).await;

        assert_eq!(
            outcome,
            RelayOutcome::Completed {
                content: "Hello".to_string()
            }
        );

        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(
            writes.last(),
            Some(&("Hello".to_string(), MessageStatus::Finished))
        );
    }

    #[tokio::test]
    async fn test_relay_with_no_deltas_still_finishes() {
        let store = Arc::new(RecordingStore::default());
        let sink = sink_for(&store);
        let events = futures::stream::iter(Vec::<anyhow::Result<StreamEvent>>::new());

        let outcome = drive_relay(events, &sink, Duration::from_secs(5)).await;

        assert_eq!(
            outcome,
            RelayOutcome::Completed {
                content: String::new()
            }
        );

        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(writes, vec![(String::new(), MessageStatus::Finished)]);
    }

    #[tokio::test]
    async fn test_relay_transport_failure_keeps_last_status() {
        let store = Arc::new(RecordingStore::default());
        let sink = sink_for(&store);
        let events = futures::stream::iter(vec![
            delta("par"),
            Err(anyhow::anyhow!("connection reset")),
        ]);

        let outcome = drive_relay(events, &sink, Duration::from_secs(5)).await;

        assert_eq!(
            outcome,
            RelayOutcome::TransportFailed {
                content: "par".to_string()
            }
        );

        let writes = store.writes.lock().unwrap().clone();
        assert!(writes
            .iter()
            .all(|(_, status)| *status != MessageStatus::Finished));
    }

    #[tokio::test]
    async fn test_relay_idle_timeout_marks_failed() {
        let store = Arc::new(RecordingStore::default());
        let sink = sink_for(&store);
        let events = futures::stream::pending::<anyhow::Result<StreamEvent>>();

        let outcome = drive_relay(events, &sink, Duration::from_millis(50)).await;

        assert_eq!(
            outcome,
            RelayOutcome::TimedOut {
                content: String::new()
            }
        );

        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(
            writes.last(),
            Some(&(String::new(), MessageStatus::Failed))
        );
    }
}
