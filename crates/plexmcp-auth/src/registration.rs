//! Client identity establishment.
//!
//! Preferred: a client-id metadata document URL (when both configured and
//! advertised by the authorization server). Fallback: RFC 7591 dynamic
//! client registration against the server's registration endpoint.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use plexmcp_protocol::Result;

use crate::flow_error;
use crate::types::{AuthorizationServerMetadata, ClientIdentity};

/// RFC 7591 registration request body.
#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    redirect_uris: [&'a str; 1],
    grant_types: [&'a str; 2],
    response_types: [&'a str; 1],
    token_endpoint_auth_method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_name: Option<&'a str>,
}

/// RFC 7591 registration response body (relevant fields).
#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    client_id: String,
    client_secret: Option<String>,
}

/// Validate a client-id metadata document URL: absolute, HTTPS, and with a
/// real path (more than the bare `/`).
pub fn validate_client_metadata_document_uri(uri: &Url) -> Result<()> {
    if uri.scheme() != "https" {
        return Err(flow_error(format!(
            "client metadata document URL must use https, got '{}'",
            uri.scheme()
        )));
    }
    if uri.host_str().is_none() {
        return Err(flow_error("client metadata document URL must be absolute"));
    }
    if uri.path().len() <= 1 {
        return Err(flow_error(
            "client metadata document URL must carry a document path",
        ));
    }
    Ok(())
}

/// Perform dynamic client registration.
pub async fn register_client(
    http: &reqwest::Client,
    metadata: &AuthorizationServerMetadata,
    redirect_uri: &Url,
    client_name: Option<&str>,
) -> Result<ClientIdentity> {
    let endpoint = metadata.registration_endpoint.as_deref().ok_or_else(|| {
        flow_error("authorization server offers no registration endpoint and no client is configured")
    })?;

    let request = RegistrationRequest {
        redirect_uris: [redirect_uri.as_str()],
        grant_types: ["authorization_code", "refresh_token"],
        response_types: ["code"],
        token_endpoint_auth_method: "none",
        client_name,
    };
    let response = http
        .post(endpoint)
        .json(&request)
        .send()
        .await
        .map_err(|e| flow_error(format!("client registration failed: {e}")))?;
    if !response.status().is_success() {
        return Err(flow_error(format!(
            "client registration returned {}",
            response.status()
        )));
    }
    let registered: RegistrationResponse = response
        .json()
        .await
        .map_err(|e| flow_error(format!("client registration response was not valid JSON: {e}")))?;

    debug!(client_id = %registered.client_id, "dynamic client registration succeeded");
    Ok(ClientIdentity {
        client_id: registered.client_id,
        client_secret: registered.client_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cimd_url_validation() {
        let good = Url::parse("https://client.example/metadata.json").unwrap();
        assert!(validate_client_metadata_document_uri(&good).is_ok());

        let http = Url::parse("http://client.example/metadata.json").unwrap();
        assert!(validate_client_metadata_document_uri(&http).is_err());

        let rootless = Url::parse("https://client.example/").unwrap();
        assert!(validate_client_metadata_document_uri(&rootless).is_err());
    }
}
