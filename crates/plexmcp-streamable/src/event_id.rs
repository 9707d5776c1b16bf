//! Event-id codec.
//!
//! An event id is the canonical encoding of `(session_id, stream_id,
//! sequence)`: two base64 parts and a decimal, joined by colons. Base64
//! never produces a colon, so the triple survives any session or stream
//! identifier - printable ASCII, embedded colons and pipes, full Unicode.
//! Parse failure of any part means the reader is simply not opened.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

/// A parsed event id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventId {
    /// Session the event belongs to
    pub session_id: String,
    /// Stream within the session
    pub stream_id: String,
    /// Per-(session, stream) sequence, starting at 1
    pub sequence: u64,
}

impl EventId {
    /// Build an event id.
    pub fn new(session_id: impl Into<String>, stream_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            session_id: session_id.into(),
            stream_id: stream_id.into(),
            sequence,
        }
    }

    /// Encode to the wire form `base64(session):base64(stream):sequence`.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}",
            STANDARD.encode(self.session_id.as_bytes()),
            STANDARD.encode(self.stream_id.as_bytes()),
            self.sequence
        )
    }

    /// Parse the wire form. Returns `None` on any malformed part: wrong
    /// number of colon-separated fields, invalid base64, non-UTF-8 bytes,
    /// or a non-decimal sequence.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(':');
        let session_part = parts.next()?;
        let stream_part = parts.next()?;
        let sequence_part = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let session_id = String::from_utf8(STANDARD.decode(session_part).ok()?).ok()?;
        let stream_id = String::from_utf8(STANDARD.decode(stream_part).ok()?).ok()?;
        // Reject signs, whitespace, and empty strings that u64::from_str
        // would otherwise be lenient about via trim-like behavior.
        if sequence_part.is_empty() || !sequence_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let sequence = sequence_part.parse().ok()?;

        Some(Self {
            session_id,
            stream_id,
            sequence,
        })
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn round_trip_plain_identifiers() {
        let id = EventId::new("mcp-abc123", "stream-1", 42);
        assert_eq!(EventId::parse(&id.encode()), Some(id));
    }

    #[test]
    fn round_trip_hostile_identifiers() {
        for (session, stream) in [
            ("with:colons", "and|pipes"),
            ("unicode-κόσμος", "流-stream"),
            ("", ""),
            ("a:b:c:d", ":::"),
        ] {
            let id = EventId::new(session, stream, u64::MAX);
            assert_eq!(EventId::parse(&id.encode()), Some(id), "{session}/{stream}");
        }
    }

    #[test]
    fn malformed_inputs_do_not_parse() {
        for raw in [
            "",
            "onlyonepart",
            "two:parts",
            "a:b:c:d",
            "!!!:YQ==:1",
            "YQ==:!!!:1",
            "YQ==:YQ==:notanumber",
            "YQ==:YQ==:-1",
            "YQ==:YQ==:1 ",
            "YQ==:YQ==:",
        ] {
            assert_eq!(EventId::parse(raw), None, "{raw:?}");
        }
    }

    proptest! {
        #[test]
        fn round_trip_any_printable_and_unicode(
            session in "\\PC{0,32}",
            stream in "\\PC{0,32}",
            sequence in 0u64..(1 << 62),
        ) {
            let id = EventId::new(session, stream, sequence);
            prop_assert_eq!(EventId::parse(&id.encode()), Some(id));
        }
    }
}
