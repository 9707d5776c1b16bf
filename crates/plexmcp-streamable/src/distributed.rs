//! Distributed event-stream store.
//!
//! The same reader/writer contracts as the in-memory store, implemented over
//! an abstract K/V cache whose records carry both a sliding and an absolute
//! TTL. Cache-read amplification is bounded: a polling `get_reader` performs
//! exactly one metadata read, and event reads are one `get` per event.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::EventStreamError;
use crate::event_id::EventId;
use crate::store::{
    EventStreamConfig, EventStreamItem, EventStreamReader, EventStreamStore, EventStreamWriter,
    StreamMetadata, StreamMode, unix_millis,
};

/// A distributed K/V cache with two per-record TTLs.
///
/// `get` refreshes a record's sliding window; a record disappears when
/// either its sliding window lapses without access or its absolute deadline
/// passes.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Fetch a record, refreshing its sliding expiration.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EventStreamError>;

    /// Store a record with the given expirations.
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        sliding: Duration,
        absolute: Duration,
    ) -> Result<(), EventStreamError>;

    /// Remove a record. Absent keys are not an error.
    async fn remove(&self, key: &str) -> Result<(), EventStreamError>;
}

fn meta_key(session_id: &str, stream_id: &str) -> String {
    // The event-id codec already makes the pair safe for any identifier.
    format!("es-meta:{}", EventId::new(session_id, stream_id, 0).encode())
}

fn event_key(session_id: &str, stream_id: &str, sequence: u64) -> String {
    format!(
        "es-evt:{}",
        EventId::new(session_id, stream_id, sequence).encode()
    )
}

/// [`EventStreamStore`] over a [`DistributedCache`].
pub struct DistributedEventStreamStore<C> {
    cache: Arc<C>,
    config: EventStreamConfig,
}

impl<C: DistributedCache> DistributedEventStreamStore<C> {
    /// Create a store over the given cache.
    pub fn new(cache: Arc<C>, config: EventStreamConfig) -> Self {
        Self { cache, config }
    }

    async fn load_metadata(
        &self,
        session_id: &str,
        stream_id: &str,
    ) -> Result<Option<StreamMetadata>, EventStreamError> {
        let Some(bytes) = self.cache.get(&meta_key(session_id, stream_id)).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| EventStreamError::Backend(format!("corrupt stream metadata: {e}")))
    }

    async fn store_metadata(&self, meta: &StreamMetadata) -> Result<(), EventStreamError> {
        let bytes = serde_json::to_vec(meta)
            .map_err(|e| EventStreamError::Backend(format!("metadata encoding failed: {e}")))?;
        self.cache
            .put(
                &meta_key(&meta.session_id, &meta.stream_id),
                bytes,
                self.config.metadata_sliding_expiration,
                self.config.metadata_absolute_expiration,
            )
            .await
    }
}

#[async_trait]
impl<C: DistributedCache + 'static> EventStreamStore for DistributedEventStreamStore<C> {
    async fn create_writer(
        &self,
        session_id: &str,
        stream_id: &str,
        mode: StreamMode,
    ) -> Result<Box<dyn EventStreamWriter>, EventStreamError> {
        let meta = match self.load_metadata(session_id, stream_id).await? {
            Some(existing) => existing,
            None => {
                let meta = StreamMetadata {
                    session_id: session_id.to_string(),
                    stream_id: stream_id.to_string(),
                    mode,
                    next_sequence: 1,
                    is_completed: false,
                    last_updated_at: unix_millis(),
                };
                self.store_metadata(&meta).await?;
                meta
            }
        };
        Ok(Box::new(DistributedWriter {
            cache: self.cache.clone(),
            config: self.config.clone(),
            meta: Mutex::new(meta),
        }))
    }

    async fn get_reader(&self, last_event_id: &str) -> Option<Box<dyn EventStreamReader>> {
        let id = EventId::parse(last_event_id)?;
        // The single metadata read a polling open is allowed.
        let meta = self
            .load_metadata(&id.session_id, &id.stream_id)
            .await
            .ok()??;
        Some(Box::new(DistributedReader {
            cache: self.cache.clone(),
            config: self.config.clone(),
            session_id: id.session_id,
            stream_id: id.stream_id,
            cursor: id.sequence,
            snapshot: meta,
        }))
    }
}

/// Writes are serialized per stream through the writer's own mutex; the
/// store contract requires a single writer per stream.
struct DistributedWriter<C> {
    cache: Arc<C>,
    config: EventStreamConfig,
    meta: Mutex<StreamMetadata>,
}

#[async_trait]
impl<C: DistributedCache> EventStreamWriter for DistributedWriter<C> {
    async fn write_event(
        &self,
        mut item: EventStreamItem,
    ) -> Result<EventStreamItem, EventStreamError> {
        let mut meta = self.meta.lock().await;
        if meta.is_completed {
            return Err(EventStreamError::StreamCompleted {
                session_id: meta.session_id.clone(),
                stream_id: meta.stream_id.clone(),
            });
        }
        let sequence = meta.next_sequence;
        if item.event_id.is_empty() {
            item.event_id = EventId::new(&meta.session_id, &meta.stream_id, sequence).encode();
        }
        let bytes = serde_json::to_vec(&item)
            .map_err(|e| EventStreamError::Backend(format!("event encoding failed: {e}")))?;
        self.cache
            .put(
                &event_key(&meta.session_id, &meta.stream_id, sequence),
                bytes,
                self.config.event_sliding_expiration,
                self.config.event_absolute_expiration,
            )
            .await?;

        meta.next_sequence = sequence + 1;
        meta.last_updated_at = unix_millis();
        self.persist(&meta).await?;
        Ok(item)
    }

    async fn set_mode(&self, mode: StreamMode) -> Result<(), EventStreamError> {
        let mut meta = self.meta.lock().await;
        meta.mode = mode;
        meta.last_updated_at = unix_millis();
        self.persist(&meta).await
    }

    async fn dispose(&self) -> Result<(), EventStreamError> {
        let mut meta = self.meta.lock().await;
        if meta.is_completed {
            return Ok(());
        }
        meta.is_completed = true;
        meta.last_updated_at = unix_millis();
        self.persist(&meta).await
    }
}

impl<C: DistributedCache> DistributedWriter<C> {
    async fn persist(&self, meta: &StreamMetadata) -> Result<(), EventStreamError> {
        let bytes = serde_json::to_vec(meta)
            .map_err(|e| EventStreamError::Backend(format!("metadata encoding failed: {e}")))?;
        self.cache
            .put(
                &meta_key(&meta.session_id, &meta.stream_id),
                bytes,
                self.config.metadata_sliding_expiration,
                self.config.metadata_absolute_expiration,
            )
            .await
    }
}

struct DistributedReader<C> {
    cache: Arc<C>,
    config: EventStreamConfig,
    session_id: String,
    stream_id: String,
    cursor: u64,
    /// Metadata snapshot from open; authoritative for polling reads,
    /// refreshed per wake in streaming reads.
    snapshot: StreamMetadata,
}

#[async_trait]
impl<C: DistributedCache + 'static> EventStreamReader for DistributedReader<C> {
    async fn next_event(&mut self) -> Result<Option<EventStreamItem>, EventStreamError> {
        loop {
            let next = self.cursor + 1;
            if next < self.snapshot.next_sequence {
                let key = event_key(&self.session_id, &self.stream_id, next);
                match self.cache.get(&key).await? {
                    Some(bytes) => {
                        let item: EventStreamItem = serde_json::from_slice(&bytes)
                            .map_err(|e| {
                                EventStreamError::Backend(format!("corrupt event record: {e}"))
                            })?;
                        self.cursor = next;
                        return Ok(Some(item));
                    }
                    None => {
                        // Assigned but gone: the payload TTL lapsed.
                        return Err(EventStreamError::EventMissing {
                            event_id: EventId::new(&self.session_id, &self.stream_id, next)
                                .encode(),
                        });
                    }
                }
            }

            if self.snapshot.mode == StreamMode::Polling || self.snapshot.is_completed {
                return Ok(None);
            }

            tokio::time::sleep(self.config.stream_reader_polling_interval).await;
            // Streaming reads re-consult metadata on each wake; its absence
            // mid-read is the typed expiration failure.
            let bytes = self
                .cache
                .get(&meta_key(&self.session_id, &self.stream_id))
                .await?;
            match bytes {
                Some(bytes) => {
                    self.snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                        EventStreamError::Backend(format!("corrupt stream metadata: {e}"))
                    })?;
                }
                None => {
                    return Err(EventStreamError::MetadataExpired {
                        session_id: self.session_id.clone(),
                        stream_id: self.stream_id.clone(),
                    });
                }
            }
        }
    }
}

/// A [`DistributedCache`] in local memory, used by tests and single-process
/// deployments.
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

struct CacheEntry {
    value: Vec<u8>,
    sliding: Duration,
    sliding_deadline: Instant,
    absolute_deadline: Instant,
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EventStreamError> {
        let now = Instant::now();
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if now >= entry.sliding_deadline || now >= entry.absolute_deadline {
                    true
                } else {
                    entry.sliding_deadline = now + entry.sliding;
                    return Ok(Some(entry.value.clone()));
                }
            }
            None => return Ok(None),
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        sliding: Duration,
        absolute: Duration,
    ) -> Result<(), EventStreamError> {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                sliding,
                sliding_deadline: now + sliding,
                absolute_deadline: now + absolute,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), EventStreamError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fast_config() -> EventStreamConfig {
        EventStreamConfig {
            stream_reader_polling_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn store() -> DistributedEventStreamStore<InMemoryCache> {
        DistributedEventStreamStore::new(Arc::new(InMemoryCache::new()), fast_config())
    }

    #[tokio::test]
    async fn resume_semantics_match_the_memory_store() {
        let store = store();
        let writer = store
            .create_writer("S", "X", StreamMode::Polling)
            .await
            .unwrap();
        for i in 1..=4u8 {
            writer
                .write_event(EventStreamItem::data(format!("event-{i}")))
                .await
                .unwrap();
        }

        let resume = EventId::new("S", "X", 2).encode();
        let mut reader = store.get_reader(&resume).await.unwrap();
        let mut data = Vec::new();
        while let Some(item) = reader.next_event().await.unwrap() {
            data.push(item.data);
        }
        assert_eq!(data, vec!["event-3", "event-4"]);
    }

    #[tokio::test]
    async fn expired_event_record_yields_missing_event() {
        let config = EventStreamConfig {
            event_sliding_expiration: Duration::from_millis(15),
            event_absolute_expiration: Duration::from_millis(15),
            stream_reader_polling_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let store =
            DistributedEventStreamStore::new(Arc::new(InMemoryCache::new()), config);
        let writer = store
            .create_writer("S", "X", StreamMode::Polling)
            .await
            .unwrap();
        writer
            .write_event(EventStreamItem::data("gone"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let resume = EventId::new("S", "X", 0).encode();
        let mut reader = store.get_reader(&resume).await.unwrap();
        assert!(matches!(
            reader.next_event().await,
            Err(EventStreamError::EventMissing { .. })
        ));
    }

    #[tokio::test]
    async fn streaming_reader_surfaces_metadata_expiry() {
        let config = EventStreamConfig {
            metadata_sliding_expiration: Duration::from_millis(25),
            metadata_absolute_expiration: Duration::from_millis(25),
            stream_reader_polling_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let store =
            DistributedEventStreamStore::new(Arc::new(InMemoryCache::new()), config);
        let writer = store
            .create_writer("S", "X", StreamMode::Streaming)
            .await
            .unwrap();
        writer
            .write_event(EventStreamItem::data("only"))
            .await
            .unwrap();

        let resume = EventId::new("S", "X", 1).encode();
        let mut reader = store.get_reader(&resume).await.unwrap();
        drop(writer);
        match reader.next_event().await {
            Err(EventStreamError::MetadataExpired { session_id, .. }) => {
                assert_eq!(session_id, "S");
            }
            other => panic!("expected MetadataExpired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writer_resumes_sequence_from_persisted_metadata() {
        let cache = Arc::new(InMemoryCache::new());
        let store = DistributedEventStreamStore::new(cache.clone(), fast_config());
        {
            let writer = store
                .create_writer("S", "X", StreamMode::Polling)
                .await
                .unwrap();
            writer
                .write_event(EventStreamItem::data("first"))
                .await
                .unwrap();
        }
        // A new writer over the same cache continues the sequence.
        let store2 = DistributedEventStreamStore::new(cache, fast_config());
        let writer = store2
            .create_writer("S", "X", StreamMode::Polling)
            .await
            .unwrap();
        let item = writer
            .write_event(EventStreamItem::data("second"))
            .await
            .unwrap();
        assert_eq!(EventId::parse(&item.event_id).unwrap().sequence, 2);
    }
}
