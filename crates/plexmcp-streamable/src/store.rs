//! Event-stream store contract.
//!
//! A store hosts many `(session, stream)` append logs with strictly
//! increasing sequences. Writers assign event ids, refresh stream metadata,
//! flip delivery modes, and complete streams; readers resume from a
//! `Last-Event-ID` and either follow the stream live (`streaming`) or drain
//! what exists and return promptly (`polling`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EventStreamError;

/// Delivery mode of a stream, visible to live readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Readers block for new events until completion, a mode flip, or
    /// cancellation.
    Streaming,
    /// Readers drain currently-available events and complete promptly.
    Polling,
}

/// One event as written to / read from a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStreamItem {
    /// Encoded `(session, stream, sequence)` id; empty on write means the
    /// writer assigns one
    #[serde(default)]
    pub event_id: String,
    /// Event payload (a serialized JSON-RPC frame in the HTTP transport)
    pub data: String,
    /// SSE event type, when not the default `message`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Reconnection-interval hint forwarded as the SSE `retry` field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnection_interval: Option<Duration>,
}

impl EventStreamItem {
    /// An item with data only; the writer assigns the id.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event_id: String::new(),
            data: data.into(),
            event_type: None,
            reconnection_interval: None,
        }
    }
}

/// Stream metadata, refreshed on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Session the stream belongs to
    pub session_id: String,
    /// The stream within the session
    pub stream_id: String,
    /// Current delivery mode
    pub mode: StreamMode,
    /// Sequence the next written event receives
    pub next_sequence: u64,
    /// True once the stream is completed
    pub is_completed: bool,
    /// Unix milliseconds of the last metadata refresh
    pub last_updated_at: u64,
}

/// Expiration and pacing knobs for a store.
#[derive(Debug, Clone)]
pub struct EventStreamConfig {
    /// Sliding expiration applied per event record
    pub event_sliding_expiration: Duration,
    /// Absolute expiration applied per event record
    pub event_absolute_expiration: Duration,
    /// Sliding expiration applied to stream metadata
    pub metadata_sliding_expiration: Duration,
    /// Absolute expiration applied to stream metadata
    pub metadata_absolute_expiration: Duration,
    /// How often a blocked streaming reader polls for changes
    pub stream_reader_polling_interval: Duration,
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            event_sliding_expiration: Duration::from_secs(300),
            event_absolute_expiration: Duration::from_secs(1800),
            metadata_sliding_expiration: Duration::from_secs(600),
            metadata_absolute_expiration: Duration::from_secs(3600),
            stream_reader_polling_interval: Duration::from_millis(100),
        }
    }
}

/// Appends events to one stream.
#[async_trait]
pub trait EventStreamWriter: Send + Sync {
    /// Persist one event. An empty `event_id` is replaced with the encoding
    /// of `(session, stream, next_sequence)`; the assigned item is returned.
    /// Fails with [`EventStreamError::StreamCompleted`] after `dispose`.
    async fn write_event(
        &self,
        item: EventStreamItem,
    ) -> Result<EventStreamItem, EventStreamError>;

    /// Flip the stream between streaming and polling; live readers observe
    /// the flip on their next wake.
    async fn set_mode(&self, mode: StreamMode) -> Result<(), EventStreamError>;

    /// Mark the stream completed and wake blocked readers. Idempotent.
    async fn dispose(&self) -> Result<(), EventStreamError>;
}

/// Reads events from one stream, in sequence order, starting strictly after
/// the resume position.
#[async_trait]
pub trait EventStreamReader: Send {
    /// The next event, `Ok(None)` when the read is complete (stream
    /// completed in streaming mode, or available events drained in polling
    /// mode). Dropping the reader cancels cooperatively.
    async fn next_event(&mut self) -> Result<Option<EventStreamItem>, EventStreamError>;
}

/// A store of resumable event streams.
#[async_trait]
pub trait EventStreamStore: Send + Sync {
    /// Open (or create) the writer for a stream.
    async fn create_writer(
        &self,
        session_id: &str,
        stream_id: &str,
        mode: StreamMode,
    ) -> Result<Box<dyn EventStreamWriter>, EventStreamError>;

    /// Open a reader resuming after `last_event_id`.
    ///
    /// Returns `None` when the id does not parse or the stream's metadata is
    /// unknown/expired; metadata is loaded exactly once here for polling
    /// reads.
    async fn get_reader(&self, last_event_id: &str) -> Option<Box<dyn EventStreamReader>>;
}

/// Current time in unix milliseconds.
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
