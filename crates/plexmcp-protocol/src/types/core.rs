//! Core protocol types shared across feature areas.
//!
//! - [`RequestId`] - JSON-RPC request identifier (string | integer)
//! - [`ProgressToken`] - caller-attached token for progress fan-out
//! - [`Timestamp`] - UTC timestamp wrapper serialized as RFC 3339
//! - [`Implementation`] - peer implementation info exchanged at initialize
//! - [`Cursor`] - opaque pagination cursor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-RPC request identifier: a string or an integer.
///
/// `null` is not a member - the null-id case exists only on responses to
/// unparseable requests and is modeled by
/// [`ResponseId`](crate::jsonrpc::ResponseId). Equality is by tag and value:
/// `Number(1)` never equals `String("1")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier
    String(String),
    /// Integer identifier
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// Progress token: same shape as a request id, attached by the caller to its
/// request so the peer's progress notifications can be routed back.
pub type ProgressToken = RequestId;

/// UTC timestamp serialized as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Elapsed duration since this timestamp.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Opaque pagination cursor.
pub type Cursor = String;

/// Implementation information exchanged during initialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name
    pub name: String,
    /// Implementation display title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Implementation version
    pub version: String,
}

impl Default for Implementation {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            title: None,
            version: "0.0.0".to_string(),
        }
    }
}

/// A result carrying no data beyond optional metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmptyResult {
    /// Optional metadata
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_id_equality_is_by_tag() {
        assert_ne!(RequestId::Number(1), RequestId::String("1".into()));
        assert_eq!(RequestId::Number(1), RequestId::Number(1));
    }

    #[test]
    fn request_id_untagged_serde() {
        let s: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, RequestId::String("abc".into()));
        let n: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(n, RequestId::Number(42));
        assert_eq!(serde_json::to_string(&n).unwrap(), "42");
    }

    #[test]
    fn timestamp_displays_rfc3339() {
        let ts = Timestamp::now();
        assert!(ts.to_string().contains('T'));
    }
}
