//! Filesystem roots wire types (`roots/list`, server → client).

use serde::{Deserialize, Serialize};

/// One filesystem root the client exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// Root URI, must be `file://`
    pub uri: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `roots/list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// Roots the client exposes
    pub roots: Vec<Root>,
}
