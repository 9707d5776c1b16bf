//! # plexmcp-protocol
//!
//! Protocol layer for the plexmcp workspace: JSON-RPC 2.0 framing, the error
//! taxonomy shared by every crate, capability negotiation types, and the wire
//! types for every method the session engine recognizes.
//!
//! Nothing in this crate performs I/O. Transports move bytes, the session
//! multiplexer moves frames; this crate defines what those frames mean.

pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod types;
pub mod validation;

pub use error::{Error, ErrorKind, Result};
pub use jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponsePayload, ResponseId,
};
pub use types::core::{Cursor, ProgressToken, RequestId};

/// The protocol revision this implementation targets.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Revisions the implementation can interoperate with, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];
