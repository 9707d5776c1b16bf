//! Protocol error taxonomy.
//!
//! One `Error` type flows through the whole workspace. Every error carries a
//! classification (`ErrorKind`) that maps losslessly onto a JSON-RPC error
//! code, so an error raised deep in a handler serializes to the wire and
//! re-materializes on the peer with the same kind. Domain-specific codes that
//! this taxonomy does not know pass through unchanged as `Application`.

use serde_json::Value;
use thiserror::Error;

use crate::jsonrpc::JsonRpcError;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// JSON-RPC error code constants.
pub mod codes {
    /// Parse error (-32700)
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request (-32600)
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found (-32601)
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params (-32602)
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error (-32603)
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Request cancelled (-32800)
    pub const REQUEST_CANCELLED: i32 = -32800;
    /// Request timeout (-32801)
    pub const REQUEST_TIMEOUT: i32 = -32801;
}

/// Error classification for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport-level failure; the session shuts down.
    Transport,
    /// Malformed frame or a request in the wrong lifecycle phase.
    InvalidRequest,
    /// No handler registered for the method.
    MethodNotFound,
    /// Parameter-shape violation, missing capability, or unsupported
    /// task augmentation.
    InvalidParams,
    /// Unexpected handler failure.
    Internal,
    /// The request was abandoned by local or remote cancellation.
    Cancelled,
    /// The request deadline elapsed.
    Timeout,
    /// Serialization or deserialization failed.
    Serialization,
    /// Initialize has not completed (or already failed).
    Lifecycle,
    /// The peer did not advertise the capability this operation needs.
    CapabilityNotSupported,
    /// Authorization flow failure surfaced to the caller.
    Authentication,
    /// A domain-specific code passed through unchanged.
    Application(i32),
}

impl ErrorKind {
    /// The JSON-RPC error code for this kind.
    pub fn code(&self) -> i32 {
        match self {
            Self::Transport | Self::Internal => codes::INTERNAL_ERROR,
            Self::InvalidRequest | Self::Lifecycle => codes::INVALID_REQUEST,
            Self::MethodNotFound => codes::METHOD_NOT_FOUND,
            Self::InvalidParams | Self::CapabilityNotSupported => codes::INVALID_PARAMS,
            Self::Cancelled => codes::REQUEST_CANCELLED,
            Self::Timeout => codes::REQUEST_TIMEOUT,
            Self::Serialization => codes::INVALID_PARAMS,
            Self::Authentication => codes::INTERNAL_ERROR,
            Self::Application(code) => *code,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Transport => "transport",
            Self::InvalidRequest => "invalid request",
            Self::MethodNotFound => "method not found",
            Self::InvalidParams => "invalid params",
            Self::Internal => "internal",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Serialization => "serialization",
            Self::Lifecycle => "lifecycle",
            Self::CapabilityNotSupported => "capability not supported",
            Self::Authentication => "authentication",
            Self::Application(code) => return write!(f, "application ({code})"),
        };
        f.write_str(name)
    }
}

/// The workspace-wide error type.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Additional structured data forwarded on the wire when present.
    pub data: Option<Value>,
}

impl Error {
    /// Create an error with an explicit kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Transport-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Malformed frame or wrong-phase request.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// No handler registered for the method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("Method not found: {method}"))
    }

    /// Parameter-shape violation.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    /// Unexpected internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Local or remote cancellation.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Deadline expiry.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Serialization failure.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    /// Session not initialized (or already closed).
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lifecycle, message)
    }

    /// The peer did not advertise the required capability.
    pub fn capability(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CapabilityNotSupported, message)
    }

    /// Authorization failure.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// True for the two abandonment flavours.
    pub fn is_abandonment(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled | ErrorKind::Timeout)
    }

    /// Convert to a wire-level JSON-RPC error object.
    pub fn to_json_rpc(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.kind.code(),
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }

    /// Reconstruct from a wire-level JSON-RPC error object.
    ///
    /// Standard codes map back to their kinds; anything else survives as
    /// `Application` with its original code.
    pub fn from_json_rpc(error: JsonRpcError) -> Self {
        let kind = match error.code {
            codes::PARSE_ERROR | codes::INVALID_REQUEST => ErrorKind::InvalidRequest,
            codes::METHOD_NOT_FOUND => ErrorKind::MethodNotFound,
            codes::INVALID_PARAMS => ErrorKind::InvalidParams,
            codes::INTERNAL_ERROR => ErrorKind::Internal,
            codes::REQUEST_CANCELLED => ErrorKind::Cancelled,
            codes::REQUEST_TIMEOUT => ErrorKind::Timeout,
            other => ErrorKind::Application(other),
        };
        Self {
            kind,
            message: error.message,
            data: error.data,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_to_code_mapping() {
        assert_eq!(ErrorKind::MethodNotFound.code(), -32601);
        assert_eq!(ErrorKind::InvalidParams.code(), -32602);
        assert_eq!(ErrorKind::Cancelled.code(), -32800);
        assert_eq!(ErrorKind::Timeout.code(), -32801);
        assert_eq!(ErrorKind::Application(-32050).code(), -32050);
    }

    #[test]
    fn wire_round_trip_preserves_kind() {
        let err = Error::invalid_params("missing field `name`");
        let back = Error::from_json_rpc(err.to_json_rpc());
        assert_eq!(back.kind, ErrorKind::InvalidParams);
        assert_eq!(back.message, "missing field `name`");
    }

    #[test]
    fn domain_codes_pass_through() {
        let wire = JsonRpcError {
            code: -32042,
            message: "resource busy".into(),
            data: Some(serde_json::json!({"uri": "file:///x"})),
        };
        let err = Error::from_json_rpc(wire);
        assert_eq!(err.kind, ErrorKind::Application(-32042));
        assert_eq!(err.to_json_rpc().code, -32042);
        assert!(err.data.is_some());
    }

    #[test]
    fn abandonment_classification() {
        assert!(Error::cancelled("x").is_abandonment());
        assert!(Error::timeout("x").is_abandonment());
        assert!(!Error::internal("x").is_abandonment());
    }
}
