//! Transport frame wrapper.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A frame moving through a transport: an encoded JSON-RPC message plus
/// transport-level metadata.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    /// Encoded JSON-RPC frame
    pub payload: Bytes,
    /// Transport-level metadata
    pub metadata: TransportMessageMetadata,
}

impl TransportMessage {
    /// Wrap an encoded frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            metadata: TransportMessageMetadata::default(),
        }
    }

    /// Wrap an encoded frame with metadata.
    pub fn with_metadata(payload: impl Into<Bytes>, metadata: TransportMessageMetadata) -> Self {
        Self {
            payload: payload.into(),
            metadata,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Metadata attached to a transport frame.
///
/// HTTP transports use `headers` for `Mcp-Session-Id` and `Last-Event-ID`;
/// the stream-backed transports use `event_id` for resumability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportMessageMetadata {
    /// Event id assigned by a resumable stream, if any
    pub event_id: Option<String>,
    /// Transport headers (session id, resume position)
    pub headers: HashMap<String, String>,
}

impl TransportMessageMetadata {
    /// Builder-style header insertion.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_is_payload_size() {
        let msg = TransportMessage::new(&b"{\"jsonrpc\":\"2.0\"}"[..]);
        assert_eq!(msg.size(), 17);
    }

    #[test]
    fn header_builder() {
        let meta = TransportMessageMetadata::default().with_header("Mcp-Session-Id", "mcp-abc");
        assert_eq!(
            meta.headers.get("Mcp-Session-Id").map(String::as_str),
            Some("mcp-abc")
        );
    }
}
