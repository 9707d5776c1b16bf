//! Authorization wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored token set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenContainer {
    /// Always `Bearer`; enforced at exchange time
    pub token_type: String,
    /// The access token
    pub access_token: String,
    /// Refresh token, when the server issued one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the container was obtained
    pub obtained_at: DateTime<Utc>,
    /// Access-token lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Granted scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenContainer {
    /// Expired when `obtained_at + expires_in` is not in the future. A
    /// container without `expires_in` never self-expires.
    pub fn is_expired(&self) -> bool {
        match self.expires_in {
            Some(seconds) => {
                self.obtained_at + chrono::Duration::seconds(seconds as i64) <= Utc::now()
            }
            None => false,
        }
    }
}

/// Token-endpoint response (RFC 6749 §5.1).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The access token
    pub access_token: String,
    /// Token type; must be `Bearer`
    pub token_type: String,
    /// Refresh token, when rotated or newly issued
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    pub expires_in: Option<u64>,
    /// Granted scope
    pub scope: Option<String>,
}

/// Protected-resource metadata (RFC 9728).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The resource identifier this metadata describes
    pub resource: String,
    /// Authorization servers protecting the resource
    #[serde(default)]
    pub authorization_servers: Vec<String>,
    /// Scopes the resource understands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
}

/// Authorization-server metadata (RFC 8414 / OIDC discovery), with the
/// optional arrays already defaulted by the fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer identifier
    pub issuer: String,
    /// Authorization endpoint
    pub authorization_endpoint: Option<String>,
    /// Token endpoint
    pub token_endpoint: Option<String>,
    /// RFC 7591 registration endpoint
    pub registration_endpoint: Option<String>,
    /// Defaults to `["code"]`
    pub response_types_supported: Option<Vec<String>>,
    /// Defaults to `["authorization_code", "refresh_token"]`
    pub grant_types_supported: Option<Vec<String>>,
    /// Defaults to `["client_secret_basic"]`
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
    /// Defaults to `["S256"]`
    pub code_challenge_methods_supported: Option<Vec<String>>,
    /// Scopes the server can grant
    pub scopes_supported: Option<Vec<String>>,
    /// The server accepts client-id metadata documents as client ids
    #[serde(default)]
    pub client_id_metadata_document_supported: bool,
}

impl AuthorizationServerMetadata {
    /// Fill the four optional arrays with their RFC 8414 defaults.
    pub fn apply_defaults(&mut self) {
        self.response_types_supported
            .get_or_insert_with(|| vec!["code".to_string()]);
        self.grant_types_supported.get_or_insert_with(|| {
            vec!["authorization_code".to_string(), "refresh_token".to_string()]
        });
        self.token_endpoint_auth_methods_supported
            .get_or_insert_with(|| vec!["client_secret_basic".to_string()]);
        self.code_challenge_methods_supported
            .get_or_insert_with(|| vec!["S256".to_string()]);
    }
}

/// The client identity used at the authorization and token endpoints,
/// either registered dynamically or named by a metadata-document URL.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// `client_id` value
    pub client_id: String,
    /// `client_secret`, when registration returned one
    pub client_secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_obtained_at_plus_lifetime() {
        let fresh = TokenContainer {
            token_type: "Bearer".into(),
            access_token: "a".into(),
            refresh_token: None,
            obtained_at: Utc::now(),
            expires_in: Some(3600),
            scope: None,
        };
        assert!(!fresh.is_expired());

        let stale = TokenContainer {
            obtained_at: Utc::now() - chrono::Duration::seconds(10),
            expires_in: Some(5),
            ..fresh.clone()
        };
        assert!(stale.is_expired());

        let eternal = TokenContainer {
            expires_in: None,
            ..fresh
        };
        assert!(!eternal.is_expired());
    }

    #[test]
    fn metadata_defaults_fill_only_absent_arrays() {
        let mut metadata = AuthorizationServerMetadata {
            issuer: "https://as.example".into(),
            authorization_endpoint: None,
            token_endpoint: None,
            registration_endpoint: None,
            response_types_supported: Some(vec!["code".into(), "token".into()]),
            grant_types_supported: None,
            token_endpoint_auth_methods_supported: None,
            code_challenge_methods_supported: None,
            scopes_supported: None,
            client_id_metadata_document_supported: false,
        };
        metadata.apply_defaults();
        assert_eq!(
            metadata.response_types_supported.as_deref(),
            Some(&["code".to_string(), "token".to_string()][..])
        );
        assert_eq!(
            metadata.grant_types_supported.as_deref(),
            Some(&["authorization_code".to_string(), "refresh_token".to_string()][..])
        );
        assert_eq!(
            metadata.code_challenge_methods_supported.as_deref(),
            Some(&["S256".to_string()][..])
        );
    }
}
