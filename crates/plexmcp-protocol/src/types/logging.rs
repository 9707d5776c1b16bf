//! Logging wire types (`logging/setLevel`, `notifications/message`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Syslog-style severity levels, least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    /// Detailed debugging information
    Debug,
    /// Normal operational messages
    Info,
    /// Normal but significant events
    Notice,
    /// Warning conditions
    Warning,
    /// Error conditions
    Error,
    /// Critical conditions
    Critical,
    /// Action must be taken immediately
    Alert,
    /// System is unusable
    Emergency,
}

impl LoggingLevel {
    /// True when a message at `level` should be delivered given this
    /// configured minimum.
    pub fn allows(&self, level: LoggingLevel) -> bool {
        level >= *self
    }
}

/// `logging/setLevel` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelRequest {
    /// Minimum level the client wants to receive
    pub level: LoggingLevel,
}

/// `notifications/message` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingMessageNotification {
    /// Message severity
    pub level: LoggingLevel,
    /// Logger name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Arbitrary JSON payload
    pub data: Value,
}
