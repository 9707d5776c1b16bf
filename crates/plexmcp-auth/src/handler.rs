//! The authorized HTTP send wrapper.
//!
//! Every send attaches a cached Bearer token when the caller set none,
//! refreshing once if expired. A `401`, or a `403` whose Bearer challenge
//! carries `error="insufficient_scope"`, triggers challenge handling:
//! protected-resource discovery, authorization-server selection and
//! discovery, refresh-then-retry when possible, client identity via
//! metadata document or dynamic registration, the PKCE authorization-code
//! flow, and one retry of the original request. Any other response passes
//! through unchanged.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use url::Url;

use plexmcp_protocol::{Error, Result};

use crate::challenge::{BearerChallenge, parse_bearer_challenges};
use crate::discovery::{
    fetch_authorization_server_metadata, normalize_resource, resolve_protected_resource,
};
use crate::flow_error;
use crate::registration::{register_client, validate_client_metadata_document_uri};
use crate::types::{ClientIdentity, TokenContainer, TokenResponse};

/// Query parameters the flow sets itself; user extras cannot overwrite them.
const RESERVED_AUTHORIZATION_PARAMS: &[&str] = &[
    "client_id",
    "redirect_uri",
    "response_type",
    "code_challenge",
    "code_challenge_method",
    "resource",
    "scope",
];

/// Yields the authorization code for an authorization URL, typically by
/// sending the user through a browser.
pub type RedirectHandler = Arc<dyn Fn(Url) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Picks one authorization server from the advertised list.
pub type AuthorizationServerSelector = Arc<dyn Fn(&[Url]) -> Option<Url> + Send + Sync>;

/// Configuration for the challenge handler.
#[derive(Clone)]
pub struct AuthConfig {
    /// Redirect URI registered for this client.
    pub redirect_uri: Url,
    /// Scope requested when neither the challenge nor the resource metadata
    /// names one.
    pub scopes: Option<String>,
    /// Client name sent with dynamic registration.
    pub client_name: Option<String>,
    /// Client-id metadata document URL; used as the `client_id` when the
    /// authorization server advertises support.
    pub client_metadata_document_uri: Option<Url>,
    /// Extra authorization-request parameters. Reserved parameters are
    /// silently skipped.
    pub extra_authorization_params: Vec<(String, String)>,
    /// Authorization-server selector; the returned server must come from
    /// the advertised list.
    pub select_authorization_server: AuthorizationServerSelector,
    /// Drives the user through the authorization URL.
    pub handle_redirect: RedirectHandler,
    /// Invoked after successful dynamic registration, so the caller can
    /// persist the identity.
    pub on_client_registered: Option<Arc<dyn Fn(&ClientIdentity) + Send + Sync>>,
}

impl AuthConfig {
    /// A config with the default (first-listed) server selector.
    pub fn new(redirect_uri: Url, handle_redirect: RedirectHandler) -> Self {
        Self {
            redirect_uri,
            scopes: None,
            client_name: None,
            client_metadata_document_uri: None,
            extra_authorization_params: Vec::new(),
            select_authorization_server: Arc::new(|servers| servers.first().cloned()),
            handle_redirect,
            on_client_registered: None,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Cached authorization state: the token plus everything needed to refresh
/// it without re-running discovery.
struct TokenState {
    container: TokenContainer,
    token_endpoint: String,
    identity: ClientIdentity,
    resource: String,
}

/// HTTP client wrapper that recovers from Bearer challenges.
///
/// The cache is a single-instance guarded accessor; it makes no
/// cross-process coherence promise.
pub struct OAuthHttpClient {
    http: reqwest::Client,
    config: AuthConfig,
    state: Mutex<Option<TokenState>>,
}

impl OAuthHttpClient {
    /// Wrap an HTTP client.
    pub fn new(http: reqwest::Client, config: AuthConfig) -> Self {
        Self {
            http,
            config,
            state: Mutex::new(None),
        }
    }

    /// The cached token container, for inspection.
    pub async fn token(&self) -> Option<TokenContainer> {
        self.state.lock().await.as_ref().map(|s| s.container.clone())
    }

    /// Send a request, transparently supplying Bearer tokens and recovering
    /// from authentication challenges at most once per call.
    pub async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let template = request.try_clone().ok_or_else(|| {
            Error::invalid_params("authorized requests need a cloneable (non-streaming) body")
        })?;
        let caller_set_authorization = request.headers().contains_key(AUTHORIZATION);

        let mut request = request;
        let mut refreshed_this_send = false;
        if !caller_set_authorization {
            let mut guard = self.state.lock().await;
            if let Some(state) = guard.as_mut() {
                if state.container.is_expired() && state.container.refresh_token.is_some() {
                    match self.refresh(state).await {
                        Ok(()) => refreshed_this_send = true,
                        Err(err) => warn!(%err, "token refresh before send failed"),
                    }
                }
                if !state.container.is_expired() {
                    set_bearer(&mut request, &state.container.access_token);
                }
            }
        }

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let challenge = match challenge_decision(&response) {
            ChallengeDecision::PassThrough => return Ok(response),
            ChallengeDecision::MissingBearer => {
                return Err(flow_error(
                    "the unauthorized response carried no Bearer challenge",
                ));
            }
            ChallengeDecision::Challenge(challenge) => challenge,
        };
        let status = response.status();
        debug!(%status, "authentication challenge received");
        self.handle_challenge(template, status, challenge, refreshed_this_send)
            .await
    }

    async fn handle_challenge(
        &self,
        template: reqwest::Request,
        status: StatusCode,
        challenge: BearerChallenge,
        already_refreshed: bool,
    ) -> Result<reqwest::Response> {
        let request_url = template.url().clone();
        let resource = normalize_resource(&request_url);

        let prm = resolve_protected_resource(
            &self.http,
            &request_url,
            challenge.resource_metadata(),
        )
        .await?;

        if prm.authorization_servers.is_empty() {
            return Err(flow_error(
                "protected-resource metadata lists no authorization servers",
            ));
        }
        let servers = prm
            .authorization_servers
            .iter()
            .map(|s| Url::parse(s))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| flow_error(format!("unparseable authorization server URL: {e}")))?;
        let selected = (self.config.select_authorization_server)(&servers)
            .ok_or_else(|| flow_error("no authorization server was selected"))?;
        if !servers.contains(&selected) {
            return Err(flow_error(
                "the selected authorization server is not in the advertised list",
            ));
        }

        let metadata = fetch_authorization_server_metadata(&self.http, &selected).await?;
        let token_endpoint = metadata
            .token_endpoint
            .clone()
            .ok_or_else(|| flow_error("authorization server metadata names no token endpoint"))?;

        // Refresh-then-retry, once per send, for plain 401s.
        if status == StatusCode::UNAUTHORIZED && !already_refreshed {
            let refreshed_access = {
                let mut guard = self.state.lock().await;
                match guard.as_mut() {
                    Some(state) if state.container.refresh_token.is_some() => {
                        match self.refresh(state).await {
                            Ok(()) => Some(state.container.access_token.clone()),
                            Err(err) => {
                                warn!(%err, "token refresh during challenge failed");
                                None
                            }
                        }
                    }
                    _ => None,
                }
            };
            if let Some(access) = refreshed_access {
                let retry = clone_with_bearer(&template, &access)?;
                let response = self
                    .http
                    .execute(retry)
                    .await
                    .map_err(|e| Error::transport(e.to_string()))?;
                match challenge_decision(&response) {
                    ChallengeDecision::PassThrough => return Ok(response),
                    ChallengeDecision::MissingBearer => {
                        return Err(flow_error(
                            "the retried response carried no Bearer challenge",
                        ));
                    }
                    ChallengeDecision::Challenge(_) => {
                        trace!("refreshed token still challenged; running the full flow");
                    }
                }
            }
        }

        // Client identity: metadata-document URL when both sides support it,
        // dynamic registration otherwise.
        let identity = match (
            &self.config.client_metadata_document_uri,
            metadata.client_id_metadata_document_supported,
        ) {
            (Some(document), true) => {
                validate_client_metadata_document_uri(document)?;
                ClientIdentity {
                    client_id: document.to_string(),
                    client_secret: None,
                }
            }
            _ => {
                let identity = register_client(
                    &self.http,
                    &metadata,
                    &self.config.redirect_uri,
                    self.config.client_name.as_deref(),
                )
                .await?;
                if let Some(callback) = &self.config.on_client_registered {
                    callback(&identity);
                }
                identity
            }
        };

        // PKCE, S256 only.
        let verifier = generate_code_verifier();
        let code_challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

        // Scope preference: challenge > resource metadata > configuration.
        let scope = challenge
            .scope()
            .map(str::to_string)
            .or_else(|| prm.scopes_supported.as_ref().map(|s| s.join(" ")))
            .or_else(|| self.config.scopes.clone());

        let authorization_endpoint = metadata.authorization_endpoint.as_deref().ok_or_else(
            || flow_error("authorization server metadata names no authorization endpoint"),
        )?;
        let mut authorization_url = Url::parse(authorization_endpoint)
            .map_err(|e| flow_error(format!("invalid authorization endpoint: {e}")))?;
        {
            let mut query = authorization_url.query_pairs_mut();
            query
                .append_pair("client_id", &identity.client_id)
                .append_pair("redirect_uri", self.config.redirect_uri.as_str())
                .append_pair("response_type", "code")
                .append_pair("code_challenge", &code_challenge)
                .append_pair("code_challenge_method", "S256")
                .append_pair("resource", &resource);
            if let Some(scope) = &scope {
                query.append_pair("scope", scope);
            }
            for (key, value) in &self.config.extra_authorization_params {
                if RESERVED_AUTHORIZATION_PARAMS.contains(&key.as_str()) {
                    warn!(param = %key, "extra authorization parameter shadows a reserved one; skipped");
                    continue;
                }
                query.append_pair(key, value);
            }
        }

        let code = (self.config.handle_redirect)(authorization_url).await?;

        let mut form: Vec<(&str, String)> = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", self.config.redirect_uri.to_string()),
            ("client_id", identity.client_id.clone()),
            ("resource", resource.clone()),
        ];
        if let Some(secret) = &identity.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        let container = self.exchange(&token_endpoint, &form).await?;

        let access = container.access_token.clone();
        *self.state.lock().await = Some(TokenState {
            container,
            token_endpoint,
            identity,
            resource,
        });

        let retry = clone_with_bearer(&template, &access)?;
        self.http
            .execute(retry)
            .await
            .map_err(|e| Error::transport(e.to_string()))
    }

    async fn exchange(
        &self,
        token_endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<TokenContainer> {
        let response = self
            .http
            .post(token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| flow_error(format!("token exchange failed: {e}")))?;
        if !response.status().is_success() {
            return Err(flow_error(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| flow_error(format!("token response was not valid JSON: {e}")))?;
        if !token.token_type.eq_ignore_ascii_case("bearer") {
            return Err(flow_error(format!(
                "token endpoint issued unsupported token type '{}'",
                token.token_type
            )));
        }
        Ok(TokenContainer {
            token_type: "Bearer".to_string(),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            obtained_at: Utc::now(),
            expires_in: token.expires_in,
            scope: token.scope,
        })
    }

    /// Refresh the cached token in place, rotating the refresh token when
    /// the server issues a new one.
    async fn refresh(&self, state: &mut TokenState) -> Result<()> {
        let refresh_token = state
            .container
            .refresh_token
            .clone()
            .ok_or_else(|| flow_error("no refresh token is cached"))?;
        let mut form: Vec<(&str, String)> = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
            ("client_id", state.identity.client_id.clone()),
            ("resource", state.resource.clone()),
        ];
        if let Some(secret) = &state.identity.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        let mut container = self.exchange(&state.token_endpoint, &form).await?;
        if container.refresh_token.is_none() {
            container.refresh_token = Some(refresh_token);
        }
        debug!("access token refreshed");
        state.container = container;
        Ok(())
    }
}

/// 32 bytes of entropy, base64url without padding (RFC 7636 §4.1).
fn generate_code_verifier() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn set_bearer(request: &mut reqwest::Request, access_token: &str) {
    if let Ok(value) = format!("Bearer {access_token}").parse() {
        request.headers_mut().insert(AUTHORIZATION, value);
    }
}

fn clone_with_bearer(template: &reqwest::Request, access_token: &str) -> Result<reqwest::Request> {
    let mut retry = template
        .try_clone()
        .ok_or_else(|| flow_error("original request could not be cloned for retry"))?;
    set_bearer(&mut retry, access_token);
    Ok(retry)
}

/// How a response affects the send.
enum ChallengeDecision {
    /// Not a challenge; hand the response to the caller unchanged.
    PassThrough,
    /// Retriable challenge: a `401` with a Bearer challenge, or a `403`
    /// whose Bearer challenge carries `error="insufficient_scope"`.
    Challenge(BearerChallenge),
    /// A `401` with no parseable Bearer challenge. At least one is
    /// required, so the send fails instead of entering the flow.
    MissingBearer,
}

fn challenge_decision(response: &reqwest::Response) -> ChallengeDecision {
    let headers: Vec<String> = response
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();
    let mut challenges = parse_bearer_challenges(&headers);

    match response.status() {
        StatusCode::UNAUTHORIZED => match challenges.drain(..).next() {
            Some(challenge) => ChallengeDecision::Challenge(challenge),
            None => ChallengeDecision::MissingBearer,
        },
        StatusCode::FORBIDDEN => challenges
            .into_iter()
            .find(|c| c.error() == Some("insufficient_scope"))
            .map_or(ChallengeDecision::PassThrough, ChallengeDecision::Challenge),
        _ => ChallengeDecision::PassThrough,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_verifier_shape() {
        let verifier = generate_code_verifier();
        // 32 bytes -> 43 base64url characters, no padding.
        assert_eq!(verifier.len(), 43);
        assert!(!verifier.contains('='));
    }

    #[test]
    fn challenge_derives_s256_correctly() {
        // RFC 7636 appendix B reference vector.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }
}
