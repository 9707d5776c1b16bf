//! # plexmcp-auth
//!
//! A transport-internal HTTP send wrapper that supplies Bearer tokens and
//! reacts to authentication challenges: `WWW-Authenticate` parsing, RFC 9728
//! protected-resource metadata discovery, authorization-server metadata
//! discovery (RFC 8414 and OIDC), RFC 7591 dynamic client registration with
//! a client-id-metadata-document alternative, the PKCE (S256) authorization
//! code flow, and transparent token refresh - at most one refresh attempt
//! plus one full flow per originating send.

pub mod challenge;
pub mod discovery;
pub mod handler;
pub mod registration;
pub mod types;

pub use challenge::BearerChallenge;
pub use handler::{AuthConfig, OAuthHttpClient};
pub use types::{
    AuthorizationServerMetadata, ClientIdentity, ProtectedResourceMetadata, TokenContainer,
};

/// Prefix every flow failure carries.
pub const FAILURE_PREFIX: &str =
    "Failed to handle unauthorized response with 'Bearer' scheme.";

pub(crate) fn flow_error(cause: impl std::fmt::Display) -> plexmcp_protocol::Error {
    plexmcp_protocol::Error::authentication(format!("{FAILURE_PREFIX} {cause}"))
}
