//! Content blocks shared by tool results, prompt messages, and sampling.

use serde::{Deserialize, Serialize};

/// A content block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Content {
    /// Plain text
    Text(TextContent),
    /// Base64-encoded image
    Image(ImageContent),
    /// Base64-encoded audio
    Audio(AudioContent),
    /// Link to a resource by URI
    ResourceLink(ResourceLinkContent),
}

impl Content {
    /// Text content block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent { text: text.into() })
    }

    /// The text, if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(&t.text),
            _ => None,
        }
    }
}

/// Text content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextContent {
    /// The text
    pub text: String,
}

/// Image content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    /// Base64-encoded image bytes
    pub data: String,
    /// MIME type, e.g. `image/png`
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Audio content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioContent {
    /// Base64-encoded audio bytes
    pub data: String,
    /// MIME type, e.g. `audio/wav`
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Resource link content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceLinkContent {
    /// Resource URI
    pub uri: String,
    /// Resource name
    pub name: String,
    /// MIME type of the linked resource
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}
