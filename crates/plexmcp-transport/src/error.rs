//! Transport error taxonomy.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors a transport can raise.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection was lost after being established.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The transport is closed; no further I/O is possible.
    #[error("transport closed")]
    Closed,

    /// A frame exceeded the configured maximum size.
    #[error("frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Offending frame size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// An I/O error from the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent bytes that are not a JSON-RPC frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// An HTTP-level failure (status, headers, body).
    #[error("http error: {0}")]
    Http(String),

    /// The send was rejected because the transport is not connected.
    #[error("not connected")]
    NotConnected,
}

impl From<TransportError> for plexmcp_protocol::Error {
    fn from(err: TransportError) -> Self {
        plexmcp_protocol::Error::transport(err.to_string())
    }
}
