//! Typed event-stream errors.
//!
//! The two expiration conditions are distinct because their remediation
//! differs: lost stream metadata forces the client to open a fresh stream,
//! while a lost event payload still allows reconnecting at a later event id.

use thiserror::Error;

/// Errors surfaced by event-stream readers and writers.
#[derive(Debug, Error)]
pub enum EventStreamError {
    /// Stream metadata expired or vanished mid-read; the caller must open a
    /// fresh stream.
    #[error("stream metadata expired for session '{session_id}' stream '{stream_id}'")]
    MetadataExpired {
        /// Session the stream belonged to
        session_id: String,
        /// The stream within the session
        stream_id: String,
    },

    /// A referenced event's payload is gone (its TTL was shorter than the
    /// metadata's); the caller may reconnect at a later event id.
    #[error("event '{event_id}' is no longer available")]
    EventMissing {
        /// Encoded id of the missing event
        event_id: String,
    },

    /// The stream is completed; no further writes are accepted.
    #[error("stream is completed for session '{session_id}' stream '{stream_id}'")]
    StreamCompleted {
        /// Session the stream belongs to
        session_id: String,
        /// The stream within the session
        stream_id: String,
    },

    /// Backing-store failure (serialization, cache I/O).
    #[error("event store backend error: {0}")]
    Backend(String),
}
