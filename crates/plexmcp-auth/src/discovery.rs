//! Metadata discovery.
//!
//! Protected-resource metadata (RFC 9728) comes from the challenge's
//! `resource_metadata` pointer when present, otherwise from well-known
//! probing under the request URL. Authorization-server metadata probes the
//! RFC 8414 path first and OIDC discovery second, each with and without the
//! issuer path appended; the first successful response wins.

use tracing::{debug, trace};
use url::Url;

use plexmcp_protocol::Result;

use crate::flow_error;
use crate::types::{AuthorizationServerMetadata, ProtectedResourceMetadata};

/// Well-known path for protected-resource metadata.
pub const PRM_WELL_KNOWN: &str = "/.well-known/oauth-protected-resource";
/// Well-known path for RFC 8414 authorization-server metadata.
pub const AS_WELL_KNOWN: &str = "/.well-known/oauth-authorization-server";
/// Well-known path for OIDC provider configuration.
pub const OIDC_WELL_KNOWN: &str = "/.well-known/openid-configuration";

/// Canonical form of a resource identifier: lowercased scheme and host,
/// explicit non-default port only, path without its trailing slash.
pub fn normalize_resource(url: &Url) -> String {
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let port = match url.port_or_known_default() {
        Some(port) if Some(port) != default_port(&scheme) => format!(":{port}"),
        _ => String::new(),
    };
    let path = url.path().trim_end_matches('/');
    format!("{scheme}://{host}{port}{path}")
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    }
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
) -> Result<T> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| flow_error(format!("metadata request to {url} failed: {e}")))?;
    if !response.status().is_success() {
        return Err(flow_error(format!(
            "metadata request to {url} returned {}",
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| flow_error(format!("metadata from {url} was not valid JSON: {e}")))
}

/// Candidate URLs for well-known probing: the path-suffixed variant first
/// (when the source URL has a path), then the root variant.
fn well_known_candidates(source: &Url, well_known: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let path = source.path().trim_end_matches('/');
    let mut base = source.clone();
    base.set_query(None);
    base.set_fragment(None);

    if !path.is_empty() && path != "/" {
        let mut with_path = base.clone();
        with_path.set_path(&format!("{well_known}{path}"));
        candidates.push(with_path.to_string());
    }
    let mut root = base;
    root.set_path(well_known);
    candidates.push(root.to_string());
    candidates
}

/// Resolve protected-resource metadata for a request URL.
///
/// The challenge's `resource_metadata` parameter is preferred; well-known
/// probing is the fallback. The metadata's `resource` must equal the
/// request resource after normalization.
pub async fn resolve_protected_resource(
    http: &reqwest::Client,
    request_url: &Url,
    resource_metadata_param: Option<&str>,
) -> Result<ProtectedResourceMetadata> {
    let metadata: ProtectedResourceMetadata = match resource_metadata_param {
        Some(pointer) => fetch_json(http, pointer).await?,
        None => {
            let mut last_error = None;
            let mut found = None;
            for candidate in well_known_candidates(request_url, PRM_WELL_KNOWN) {
                trace!(url = %candidate, "probing protected-resource metadata");
                match fetch_json(http, &candidate).await {
                    Ok(metadata) => {
                        found = Some(metadata);
                        break;
                    }
                    Err(err) => last_error = Some(err),
                }
            }
            found.ok_or_else(|| {
                last_error.unwrap_or_else(|| {
                    flow_error("no protected-resource metadata endpoint responded")
                })
            })?
        }
    };

    let declared = Url::parse(&metadata.resource)
        .map_err(|e| flow_error(format!("protected-resource metadata names an invalid resource: {e}")))?;
    let expected = normalize_resource(request_url);
    let actual = normalize_resource(&declared);
    if expected != actual {
        return Err(flow_error(format!(
            "protected-resource metadata is for '{actual}' but the request targets '{expected}'"
        )));
    }
    debug!(resource = %actual, "protected-resource metadata resolved");
    Ok(metadata)
}

/// Fetch authorization-server metadata for an issuer, probing the four
/// well-known URLs in order and applying RFC 8414 defaults to the result.
pub async fn fetch_authorization_server_metadata(
    http: &reqwest::Client,
    issuer: &Url,
) -> Result<AuthorizationServerMetadata> {
    let mut candidates = well_known_candidates(issuer, AS_WELL_KNOWN);
    candidates.extend(well_known_candidates(issuer, OIDC_WELL_KNOWN));

    let mut last_error = None;
    for candidate in candidates {
        trace!(url = %candidate, "probing authorization-server metadata");
        match fetch_json::<AuthorizationServerMetadata>(http, &candidate).await {
            Ok(mut metadata) => {
                metadata.apply_defaults();
                debug!(issuer = %metadata.issuer, url = %candidate, "authorization-server metadata resolved");
                return Ok(metadata);
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(last_error
        .unwrap_or_else(|| flow_error("no authorization-server metadata endpoint responded")))
}
