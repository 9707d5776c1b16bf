//! In-memory event-stream store.
//!
//! Per-stream state sits behind a short-hold mutex; blocked streaming
//! readers wait on a per-stream `Notify` with the configured polling
//! interval as a backstop. Expiration is enforced lazily at access time, so
//! no background sweeper is required.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::trace;

use crate::error::EventStreamError;
use crate::event_id::EventId;
use crate::store::{
    EventStreamConfig, EventStreamItem, EventStreamReader, EventStreamStore, EventStreamWriter,
    StreamMetadata, StreamMode, unix_millis,
};

struct StoredEvent {
    item: EventStreamItem,
    sliding_deadline: Instant,
    absolute_deadline: Instant,
}

struct StreamInner {
    meta: StreamMetadata,
    events: BTreeMap<u64, StoredEvent>,
    meta_sliding_deadline: Instant,
    meta_absolute_deadline: Instant,
}

struct StreamState {
    inner: Mutex<StreamInner>,
    notify: Notify,
}

impl StreamState {
    /// Refresh metadata sliding expiration and drop expired events.
    /// Returns false when the metadata itself has expired.
    fn touch(&self, inner: &mut StreamInner, config: &EventStreamConfig, now: Instant) -> bool {
        if now >= inner.meta_sliding_deadline || now >= inner.meta_absolute_deadline {
            return false;
        }
        inner.meta_sliding_deadline = now + config.metadata_sliding_expiration;
        inner
            .events
            .retain(|_, e| now < e.sliding_deadline && now < e.absolute_deadline);
        true
    }
}

/// In-memory [`EventStreamStore`].
pub struct InMemoryEventStreamStore {
    streams: DashMap<(String, String), Arc<StreamState>>,
    config: EventStreamConfig,
}

impl InMemoryEventStreamStore {
    /// Create a store with the given expirations and pacing.
    pub fn new(config: EventStreamConfig) -> Self {
        Self {
            streams: DashMap::new(),
            config,
        }
    }

    fn live_state(&self, session_id: &str, stream_id: &str) -> Option<Arc<StreamState>> {
        let key = (session_id.to_string(), stream_id.to_string());
        let state = self.streams.get(&key)?.clone();
        let now = Instant::now();
        let alive = {
            let mut inner = state.inner.lock();
            state.touch(&mut inner, &self.config, now)
        };
        if alive {
            Some(state)
        } else {
            trace!(session_id, stream_id, "expired stream metadata removed");
            self.streams.remove(&key);
            state.notify.notify_waiters();
            None
        }
    }
}

impl Default for InMemoryEventStreamStore {
    fn default() -> Self {
        Self::new(EventStreamConfig::default())
    }
}

#[async_trait]
impl EventStreamStore for InMemoryEventStreamStore {
    async fn create_writer(
        &self,
        session_id: &str,
        stream_id: &str,
        mode: StreamMode,
    ) -> Result<Box<dyn EventStreamWriter>, EventStreamError> {
        let key = (session_id.to_string(), stream_id.to_string());
        let now = Instant::now();
        let state = self
            .streams
            .entry(key)
            .or_insert_with(|| {
                Arc::new(StreamState {
                    inner: Mutex::new(StreamInner {
                        meta: StreamMetadata {
                            session_id: session_id.to_string(),
                            stream_id: stream_id.to_string(),
                            mode,
                            next_sequence: 1,
                            is_completed: false,
                            last_updated_at: unix_millis(),
                        },
                        events: BTreeMap::new(),
                        meta_sliding_deadline: now + self.config.metadata_sliding_expiration,
                        meta_absolute_deadline: now + self.config.metadata_absolute_expiration,
                    }),
                    notify: Notify::new(),
                })
            })
            .clone();

        Ok(Box::new(MemoryWriter {
            state,
            config: self.config.clone(),
        }))
    }

    async fn get_reader(&self, last_event_id: &str) -> Option<Box<dyn EventStreamReader>> {
        let id = EventId::parse(last_event_id)?;
        let state = self.live_state(&id.session_id, &id.stream_id)?;
        // The mode snapshot taken here is authoritative for a polling read:
        // polling readers never re-consult metadata.
        let mode = state.inner.lock().meta.mode;
        Some(Box::new(MemoryReader {
            state,
            config: self.config.clone(),
            session_id: id.session_id,
            stream_id: id.stream_id,
            cursor: id.sequence,
            mode_at_open: mode,
        }))
    }
}

struct MemoryWriter {
    state: Arc<StreamState>,
    config: EventStreamConfig,
}

#[async_trait]
impl EventStreamWriter for MemoryWriter {
    async fn write_event(
        &self,
        mut item: EventStreamItem,
    ) -> Result<EventStreamItem, EventStreamError> {
        let now = Instant::now();
        {
            let mut inner = self.state.inner.lock();
            if inner.meta.is_completed {
                return Err(EventStreamError::StreamCompleted {
                    session_id: inner.meta.session_id.clone(),
                    stream_id: inner.meta.stream_id.clone(),
                });
            }
            let sequence = inner.meta.next_sequence;
            if item.event_id.is_empty() {
                item.event_id =
                    EventId::new(&inner.meta.session_id, &inner.meta.stream_id, sequence).encode();
            }
            inner.events.insert(
                sequence,
                StoredEvent {
                    item: item.clone(),
                    sliding_deadline: now + self.config.event_sliding_expiration,
                    absolute_deadline: now + self.config.event_absolute_expiration,
                },
            );
            inner.meta.next_sequence = sequence + 1;
            inner.meta.last_updated_at = unix_millis();
            inner.meta_sliding_deadline = now + self.config.metadata_sliding_expiration;
        }
        self.state.notify.notify_waiters();
        Ok(item)
    }

    async fn set_mode(&self, mode: StreamMode) -> Result<(), EventStreamError> {
        {
            let mut inner = self.state.inner.lock();
            inner.meta.mode = mode;
            inner.meta.last_updated_at = unix_millis();
        }
        self.state.notify.notify_waiters();
        Ok(())
    }

    async fn dispose(&self) -> Result<(), EventStreamError> {
        {
            let mut inner = self.state.inner.lock();
            inner.meta.is_completed = true;
            inner.meta.last_updated_at = unix_millis();
        }
        self.state.notify.notify_waiters();
        Ok(())
    }
}

struct MemoryReader {
    state: Arc<StreamState>,
    config: EventStreamConfig,
    session_id: String,
    stream_id: String,
    cursor: u64,
    mode_at_open: StreamMode,
}

enum ReadStep {
    Yield(EventStreamItem),
    Missing(String),
    MetadataExpired,
    CaughtUp { completed: bool, mode: StreamMode },
}

impl MemoryReader {
    fn step(&mut self) -> ReadStep {
        let now = Instant::now();
        let mut inner = self.state.inner.lock();
        if !self.state.touch(&mut inner, &self.config, now) {
            return ReadStep::MetadataExpired;
        }

        let next = self.cursor + 1;
        if let Some((&sequence, stored)) = inner.events.range(next..).next() {
            if sequence > next && next < inner.meta.next_sequence {
                // The event at `next` once existed and its payload expired.
                return ReadStep::Missing(
                    EventId::new(&self.session_id, &self.stream_id, next).encode(),
                );
            }
            self.cursor = sequence;
            return ReadStep::Yield(stored.item.clone());
        }

        if next < inner.meta.next_sequence {
            // Everything past the cursor expired.
            return ReadStep::Missing(
                EventId::new(&self.session_id, &self.stream_id, next).encode(),
            );
        }

        ReadStep::CaughtUp {
            completed: inner.meta.is_completed,
            mode: inner.meta.mode,
        }
    }
}

#[async_trait]
impl EventStreamReader for MemoryReader {
    async fn next_event(&mut self) -> Result<Option<EventStreamItem>, EventStreamError> {
        loop {
            match self.step() {
                ReadStep::Yield(item) => return Ok(Some(item)),
                ReadStep::Missing(event_id) => {
                    return Err(EventStreamError::EventMissing { event_id });
                }
                ReadStep::MetadataExpired => {
                    return Err(EventStreamError::MetadataExpired {
                        session_id: self.session_id.clone(),
                        stream_id: self.stream_id.clone(),
                    });
                }
                ReadStep::CaughtUp { completed, mode } => {
                    // Polling reads complete promptly; the snapshot taken at
                    // open is authoritative for them. A live flip to polling
                    // ends a streaming read at its next wake.
                    if self.mode_at_open == StreamMode::Polling
                        || mode == StreamMode::Polling
                        || completed
                    {
                        return Ok(None);
                    }
                    tokio::select! {
                        () = self.state.notify.notified() => {}
                        () = tokio::time::sleep(self.config.stream_reader_polling_interval) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn fast_config() -> EventStreamConfig {
        EventStreamConfig {
            stream_reader_polling_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn write_n(writer: &dyn EventStreamWriter, n: u64) {
        for i in 1..=n {
            writer
                .write_event(EventStreamItem::data(format!("event-{i}")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn sequences_start_at_one_and_increase() {
        let store = InMemoryEventStreamStore::new(fast_config());
        let writer = store
            .create_writer("S", "X", StreamMode::Polling)
            .await
            .unwrap();
        let first = writer
            .write_event(EventStreamItem::data("a"))
            .await
            .unwrap();
        let second = writer
            .write_event(EventStreamItem::data("b"))
            .await
            .unwrap();
        assert_eq!(EventId::parse(&first.event_id).unwrap().sequence, 1);
        assert_eq!(EventId::parse(&second.event_id).unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn reader_resumes_strictly_after_the_given_sequence() {
        let store = InMemoryEventStreamStore::new(fast_config());
        let writer = store
            .create_writer("S", "X", StreamMode::Polling)
            .await
            .unwrap();
        write_n(writer.as_ref(), 4).await;

        let resume = EventId::new("S", "X", 2).encode();
        let mut reader = store.get_reader(&resume).await.unwrap();
        let mut data = Vec::new();
        while let Some(item) = reader.next_event().await.unwrap() {
            data.push(item.data);
        }
        assert_eq!(data, vec!["event-3", "event-4"]);
    }

    #[tokio::test]
    async fn polling_reader_at_head_yields_nothing_and_completes() {
        let store = InMemoryEventStreamStore::new(fast_config());
        let writer = store
            .create_writer("S", "X", StreamMode::Polling)
            .await
            .unwrap();
        write_n(writer.as_ref(), 4).await;

        let resume = EventId::new("S", "X", 4).encode();
        let mut reader = store.get_reader(&resume).await.unwrap();
        assert_eq!(reader.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn streaming_reader_blocks_until_new_event() {
        let store = Arc::new(InMemoryEventStreamStore::new(fast_config()));
        let writer = store
            .create_writer("S", "live", StreamMode::Streaming)
            .await
            .unwrap();
        write_n(writer.as_ref(), 1).await;

        let resume = EventId::new("S", "live", 1).encode();
        let mut reader = store.get_reader(&resume).await.unwrap();

        let writer_task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer
                .write_event(EventStreamItem::data("late"))
                .await
                .unwrap();
            writer.dispose().await.unwrap();
        });

        let item = reader.next_event().await.unwrap().unwrap();
        assert_eq!(item.data, "late");
        assert_eq!(reader.next_event().await.unwrap(), None);
        writer_task.await.unwrap();
    }

    #[tokio::test]
    async fn streaming_reader_ends_when_mode_flips_to_polling() {
        let store = InMemoryEventStreamStore::new(fast_config());
        let writer = store
            .create_writer("S", "flip", StreamMode::Streaming)
            .await
            .unwrap();
        write_n(writer.as_ref(), 1).await;

        let resume = EventId::new("S", "flip", 1).encode();
        let mut reader = store.get_reader(&resume).await.unwrap();

        let flip = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.set_mode(StreamMode::Polling).await.unwrap();
        });
        assert_eq!(reader.next_event().await.unwrap(), None);
        flip.await.unwrap();
    }

    #[tokio::test]
    async fn unparseable_or_unknown_resume_ids_open_no_reader() {
        let store = InMemoryEventStreamStore::new(fast_config());
        assert!(store.get_reader("not-an-event-id").await.is_none());
        let unknown = EventId::new("ghost", "stream", 1).encode();
        assert!(store.get_reader(&unknown).await.is_none());
    }

    #[tokio::test]
    async fn expired_event_payload_is_a_typed_missing_event_error() {
        let config = EventStreamConfig {
            event_sliding_expiration: Duration::from_millis(20),
            event_absolute_expiration: Duration::from_millis(20),
            stream_reader_polling_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let store = InMemoryEventStreamStore::new(config);
        let writer = store
            .create_writer("S", "X", StreamMode::Polling)
            .await
            .unwrap();
        write_n(writer.as_ref(), 2).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        // Metadata is still live (longer TTL); event payloads are gone.
        let resume = EventId::new("S", "X", 0).encode();
        let mut reader = store.get_reader(&resume).await.unwrap();
        match reader.next_event().await {
            Err(EventStreamError::EventMissing { event_id }) => {
                assert_eq!(EventId::parse(&event_id).unwrap().sequence, 1);
            }
            other => panic!("expected EventMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_metadata_is_a_typed_metadata_error() {
        let config = EventStreamConfig {
            metadata_sliding_expiration: Duration::from_millis(30),
            metadata_absolute_expiration: Duration::from_millis(30),
            stream_reader_polling_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let store = InMemoryEventStreamStore::new(config);
        let writer = store
            .create_writer("S", "X", StreamMode::Streaming)
            .await
            .unwrap();
        write_n(writer.as_ref(), 1).await;

        let resume = EventId::new("S", "X", 1).encode();
        let mut reader = store.get_reader(&resume).await.unwrap();
        // Reader is caught up and blocked; metadata expires underneath it.
        match reader.next_event().await {
            Err(EventStreamError::MetadataExpired {
                session_id,
                stream_id,
            }) => {
                assert_eq!(session_id, "S");
                assert_eq!(stream_id, "X");
            }
            other => panic!("expected MetadataExpired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_blocks_writes() {
        let store = InMemoryEventStreamStore::new(fast_config());
        let writer = store
            .create_writer("S", "X", StreamMode::Streaming)
            .await
            .unwrap();
        writer.dispose().await.unwrap();
        writer.dispose().await.unwrap();
        assert!(matches!(
            writer.write_event(EventStreamItem::data("x")).await,
            Err(EventStreamError::StreamCompleted { .. })
        ));
    }

    #[tokio::test]
    async fn event_ids_are_globally_unique_across_streams() {
        let store = InMemoryEventStreamStore::new(fast_config());
        let w1 = store
            .create_writer("S", "a", StreamMode::Polling)
            .await
            .unwrap();
        let w2 = store
            .create_writer("S", "b", StreamMode::Polling)
            .await
            .unwrap();
        let e1 = w1.write_event(EventStreamItem::data("x")).await.unwrap();
        let e2 = w2.write_event(EventStreamItem::data("x")).await.unwrap();
        assert_ne!(e1.event_id, e2.event_id);
    }
}
