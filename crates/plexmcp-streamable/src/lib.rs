//! # plexmcp-streamable
//!
//! The resumable event machinery behind the streamable HTTP transport:
//!
//! - a pure, no-I/O SSE encoder/parser;
//! - the event-id codec that makes `(session, stream, sequence)` survive any
//!   printable identifier;
//! - the [`EventStreamStore`] contract with an in-memory implementation and
//!   a distributed variant over an abstract two-TTL K/V cache;
//! - the axum server transport: POST for requests (JSON or per-request SSE),
//!   GET for the server→client stream with `Last-Event-ID` resume, DELETE
//!   for session termination.

pub mod distributed;
pub mod error;
pub mod event_id;
pub mod memory;
pub mod server;
pub mod sse;
pub mod store;

pub use distributed::{DistributedCache, DistributedEventStreamStore, InMemoryCache};
pub use error::EventStreamError;
pub use event_id::EventId;
pub use memory::InMemoryEventStreamStore;
pub use server::{StreamableHttpServer, StreamableHttpServerConfig};
pub use store::{
    EventStreamConfig, EventStreamItem, EventStreamReader, EventStreamStore, EventStreamWriter,
    StreamMetadata, StreamMode,
};
