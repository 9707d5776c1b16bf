//! Elicitation wire types (`elicitation/create`, server → client).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tasks::TaskMetadata;

/// `elicitation/create` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitRequest {
    /// What the server is asking the user for
    pub message: String,
    /// Flat-object JSON schema describing the expected answer
    #[serde(rename = "requestedSchema")]
    pub requested_schema: Value,
    /// Present when the server requests task-augmented execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskMetadata>,
}

/// How the user answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    /// User submitted an answer
    Accept,
    /// User explicitly declined
    Decline,
    /// User dismissed without answering
    Cancel,
}

/// `elicitation/create` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitResult {
    /// How the user answered
    pub action: ElicitAction,
    /// The answer, present only on `accept`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}
