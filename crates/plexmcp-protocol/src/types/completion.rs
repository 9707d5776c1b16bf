//! Argument-completion wire types (`completion/complete`).

use serde::{Deserialize, Serialize};

/// What the completion is for: a prompt argument or a resource-template
/// variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// A prompt argument
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// Prompt name
        name: String,
    },
    /// A resource-template variable
    #[serde(rename = "ref/resource")]
    Resource {
        /// Template URI
        uri: String,
    },
}

/// The argument being completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionArgument {
    /// Argument name
    pub name: String,
    /// Partial value typed so far
    pub value: String,
}

/// `completion/complete` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// What is being completed
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// The argument and its partial value
    pub argument: CompletionArgument,
}

/// Completion values, capped at 100 entries per the protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Candidate values
    pub values: Vec<String>,
    /// Total candidates available, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// True when more candidates exist than were returned
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// `completion/complete` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResult {
    /// The completion
    pub completion: Completion,
}
