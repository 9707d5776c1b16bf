//! Initialize handshake types and protocol-version negotiation.

use serde::{Deserialize, Serialize};

use super::capabilities::{ClientCapabilities, ServerCapabilities};
use super::core::Implementation;
use crate::{PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};

/// `initialize` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Protocol revision the client speaks
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Client capability bag
    pub capabilities: ClientCapabilities,
    /// Client implementation info
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

/// `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol revision the server selected
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capability bag
    pub capabilities: ServerCapabilities,
    /// Server implementation info
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    /// Optional usage instructions for the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Pick the protocol version to answer with.
///
/// A supported client version is echoed; an unknown one is answered with our
/// own latest, and the client decides whether it can proceed.
pub fn negotiate_protocol_version(requested: &str) -> String {
    if SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
        requested.to_string()
    } else {
        PROTOCOL_VERSION.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_version_is_echoed() {
        assert_eq!(negotiate_protocol_version("2024-11-05"), "2024-11-05");
    }

    #[test]
    fn unknown_version_falls_back_to_latest() {
        assert_eq!(negotiate_protocol_version("1999-01-01"), PROTOCOL_VERSION);
    }
}
