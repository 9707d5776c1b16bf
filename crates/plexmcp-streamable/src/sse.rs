//! Server-Sent Events codec, no I/O.
//!
//! Wire format per event:
//!
//! ```text
//! id: <event id>
//! event: <type>
//! retry: <ms>
//! data: <line>
//!
//! ```
//!
//! A blank line terminates the event. Comment lines start with `:` and are
//! keepalives.

/// One SSE frame.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Event id for `Last-Event-ID` resumption
    pub id: Option<String>,
    /// Event type; clients treat absence as `message`
    pub event: Option<String>,
    /// Event data, possibly multiline
    pub data: String,
    /// Reconnection interval hint in milliseconds
    pub retry: Option<u64>,
}

impl SseFrame {
    /// A data-only frame.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// A frame with id and data.
    pub fn with_id(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            data: data.into(),
            ..Default::default()
        }
    }

    /// Set the event type.
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Encode to wire text.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        if let Some(retry) = self.retry {
            out.push_str("retry: ");
            out.push_str(&retry.to_string());
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Encode a keepalive comment.
pub fn encode_keepalive() -> &'static str {
    ":\n\n"
}

/// Incremental SSE parser. Feed it bytes as they arrive; it emits complete
/// frames and buffers partial ones across calls.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
    retry: Option<u64>,
}

impl SseParser {
    /// Create a parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns the frames completed by this chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let Ok(text) = std::str::from_utf8(chunk) else {
            return Vec::new();
        };
        self.buffer.push_str(text);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
            } else if line.starts_with(':') {
                // keepalive comment
            } else if let Some((field, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.set_field(field, value);
            } else {
                self.set_field(line, "");
            }
        }
        frames
    }

    fn set_field(&mut self, field: &str, value: &str) {
        match field {
            "id" => self.id = Some(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            self.id = None;
            self.event = None;
            self.retry = None;
            return None;
        }
        Some(SseFrame {
            id: self.id.take(),
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            retry: self.retry.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encode_minimal() {
        assert_eq!(SseFrame::data("hello").encode(), "data: hello\n\n");
    }

    #[test]
    fn encode_full_frame() {
        let frame = SseFrame {
            id: Some("e-1".into()),
            event: Some("message".into()),
            data: "line1\nline2".into(),
            retry: Some(3000),
        };
        assert_eq!(
            frame.encode(),
            "id: e-1\nevent: message\nretry: 3000\ndata: line1\ndata: line2\n\n"
        );
    }

    #[test]
    fn parse_single_frame() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"id: 5\ndata: payload\n\n");
        assert_eq!(frames, vec![SseFrame::with_id("5", "payload")]);
    }

    #[test]
    fn parse_across_chunk_boundaries() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"id: 9\nda").is_empty());
        assert!(parser.feed(b"ta: split\n").is_empty());
        let frames = parser.feed(b"\n");
        assert_eq!(frames, vec![SseFrame::with_id("9", "split")]);
    }

    #[test]
    fn keepalives_and_dataless_blocks_emit_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b": ping\n\n").is_empty());
        assert!(parser.feed(b"id: orphan\n\n").is_empty());
        // The orphan id must not leak into the next frame.
        let frames = parser.feed(b"data: real\n\n");
        assert_eq!(frames, vec![SseFrame::data("real")]);
    }

    #[test]
    fn codec_round_trip() {
        let frame = SseFrame::with_id("abc:def:3", r#"{"jsonrpc":"2.0","method":"ping","id":1}"#)
            .event("message");
        let mut parser = SseParser::new();
        let frames = parser.feed(frame.encode().as_bytes());
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"data: windows\r\n\r\n");
        assert_eq!(frames, vec![SseFrame::data("windows")]);
    }
}
