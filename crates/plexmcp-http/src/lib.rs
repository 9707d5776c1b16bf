//! # plexmcp-http
//!
//! Client-side HTTP transports:
//!
//! - [`StreamableHttpClient`] - POSTs each outgoing frame, parses direct
//!   JSON and SSE response bodies, carries `Mcp-Session-Id` once assigned,
//!   and keeps a GET listener stream open for server→client traffic with
//!   `Last-Event-ID` reconnection.
//! - [`SseLegacyClient`] - the older pairing of one GET event stream (whose
//!   first `endpoint` event names the POST target) with per-frame POSTs.

pub mod sse_legacy;
pub mod streamable;

pub use sse_legacy::SseLegacyClient;
pub use streamable::StreamableHttpClient;
