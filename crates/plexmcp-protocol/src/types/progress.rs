//! Progress and cancellation notification types.

use serde::{Deserialize, Serialize};

use super::core::{ProgressToken, RequestId};

/// `notifications/progress` parameters.
///
/// Progress values for one token are monotonically non-decreasing - that is
/// the sender's contract; the session forwards them in arrival order without
/// reordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressNotification {
    /// Token the caller attached to its request
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    /// Progress so far
    pub progress: f64,
    /// Total work, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Human-readable status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `notifications/cancelled` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelledNotification {
    /// Id of the request being abandoned
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    /// Why, e.g. `"timeout"` or a caller-supplied reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
