//! The session multiplexer.
//!
//! One read-loop task owns `transport.receive()`: it only decodes and routes,
//! never executes handlers inline, so response correlation is never stalled
//! behind handler completion. Writes go through the transport's writer mutex,
//! producing one ordered byte stream per direction.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use plexmcp_protocol::jsonrpc::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use plexmcp_protocol::types::initialization::negotiate_protocol_version;
use plexmcp_protocol::types::{
    CancelledNotification, ClientCapabilities, Implementation, InitializeRequest, InitializeResult,
    ProgressNotification, ServerCapabilities,
};
use plexmcp_protocol::{
    Error, ProgressToken, RequestId, Result, SUPPORTED_PROTOCOL_VERSIONS, methods,
};
use plexmcp_transport::{Transport, TransportMessage};

use crate::config::SessionConfig;
use crate::handlers::{DispatchTable, NotificationHandler, RequestContext, RequestHandler};
use crate::lifecycle::{LifecycleState, PeerCapabilities, PeerRole, check_capability, check_phase};
use crate::progress::{ProgressRegistry, ProgressSink};

/// Options for opening a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Session tunables
    pub config: SessionConfig,
    /// Our implementation info, exchanged at initialize
    pub info: Implementation,
    /// Capabilities we advertise when playing the client role
    pub client_capabilities: ClientCapabilities,
    /// Capabilities we advertise when playing the server role
    pub server_capabilities: ServerCapabilities,
    /// Usage instructions sent with our initialize result (server role)
    pub instructions: Option<String>,
}

/// Per-request options for [`Session::send_request`].
#[derive(Default)]
pub struct RequestOptions {
    /// Deadline; the config default applies when absent
    pub timeout: Option<Duration>,
    /// Caller-side cancellation; tripping it abandons the request
    pub cancellation: Option<CancellationToken>,
    /// Progress token and sink; the token is injected into the request's
    /// `_meta` and inbound progress fans out to the sink
    pub progress: Option<(ProgressToken, Arc<dyn ProgressSink>)>,
}

impl RequestOptions {
    /// Options with only a deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }
}

struct PendingRequest {
    responder: oneshot::Sender<Result<Value>>,
    progress_token: Option<ProgressToken>,
}

struct SessionInner {
    role: PeerRole,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    state: RwLock<LifecycleState>,
    peer_capabilities: RwLock<Option<PeerCapabilities>>,
    options: SessionOptions,
    next_id: AtomicI64,
    pending: DashMap<RequestId, PendingRequest>,
    progress: ProgressRegistry,
    dispatch: DispatchTable,
    session_id: RwLock<Option<String>>,
    termination: CancellationToken,
}

/// One bidirectional JSON-RPC session over one transport. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.inner.role)
            .field("state", &*self.inner.state.read())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a session over a connected transport and start its read loop.
    pub fn connect(
        role: PeerRole,
        transport: Arc<dyn Transport>,
        options: SessionOptions,
    ) -> Self {
        let session = Self {
            inner: Arc::new(SessionInner {
                role,
                config: options.config.clone(),
                transport,
                state: RwLock::new(LifecycleState::Uninitialized),
                peer_capabilities: RwLock::new(None),
                options,
                next_id: AtomicI64::new(1),
                pending: DashMap::new(),
                progress: ProgressRegistry::default(),
                dispatch: DispatchTable::default(),
                session_id: RwLock::new(None),
                termination: CancellationToken::new(),
            }),
        };
        session.spawn_read_loop();
        session
    }

    /// Which role this session plays.
    pub fn role(&self) -> PeerRole {
        self.inner.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.inner.state.read()
    }

    /// Transport-level session identifier, when one was assigned.
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.read().clone()
    }

    /// Assign the transport-level session identifier.
    pub fn set_session_id(&self, id: impl Into<String>) {
        *self.inner.session_id.write() = Some(id.into());
    }

    /// Token tripped when the session terminates. Background work scoped to
    /// the session (task executions) derives child tokens from this.
    pub fn termination(&self) -> &CancellationToken {
        &self.inner.termination
    }

    /// The peer's negotiated capability bag, once initialize completed.
    pub fn peer_capabilities(&self) -> Option<PeerCapabilities> {
        self.inner.peer_capabilities.read().clone()
    }

    /// Register the request handler for a method. One handler per method;
    /// re-registration replaces.
    pub fn on_request(&self, method: &str, handler: Arc<dyn RequestHandler>) {
        self.inner.dispatch.set_request_handler(method, handler);
    }

    /// Add a notification handler for a method.
    pub fn on_notification(&self, method: &str, handler: Arc<dyn NotificationHandler>) {
        self.inner.dispatch.add_notification_handler(method, handler);
    }

    // ------------------------------------------------------------------
    // Outgoing traffic
    // ------------------------------------------------------------------

    /// Run the initialize handshake (client role).
    ///
    /// Sends `initialize` under its own bounded timeout, verifies the
    /// negotiated protocol version, stores the server's capability bag,
    /// emits `notifications/initialized`, and opens the gate.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        if self.inner.role != PeerRole::Client {
            return Err(Error::lifecycle("only the client role issues initialize"));
        }
        if self.state() != LifecycleState::Uninitialized {
            return Err(Error::lifecycle("session is already initialized"));
        }
        *self.inner.state.write() = LifecycleState::Initializing;

        let params = InitializeRequest {
            protocol_version: plexmcp_protocol::PROTOCOL_VERSION.to_string(),
            capabilities: self.inner.options.client_capabilities.clone(),
            client_info: self.inner.options.info.clone(),
        };
        let options = RequestOptions::with_timeout(self.inner.config.initialize_timeout);
        let value = match self
            .request_inner(
                methods::INITIALIZE,
                Some(serde_json::to_value(&params)?),
                options,
            )
            .await
        {
            Ok(value) => value,
            Err(err) => {
                // Startup failed; the session never becomes usable.
                self.close().await;
                return Err(err);
            }
        };

        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| Error::invalid_request(format!("malformed initialize result: {e}")))?;
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            self.close().await;
            return Err(Error::lifecycle(format!(
                "server selected unsupported protocol version {}",
                result.protocol_version
            )));
        }

        *self.inner.peer_capabilities.write() =
            Some(PeerCapabilities::Server(result.capabilities.clone()));
        self.write_notification(JsonRpcNotification::new(
            methods::NOTIFICATION_INITIALIZED,
            None,
        ))
        .await?;
        *self.inner.state.write() = LifecycleState::Ready;
        debug!(version = %result.protocol_version, "session initialized");
        Ok(result)
    }

    /// Send a request and await its result.
    ///
    /// Resolution is exactly one of: the matching response, a cancellation
    /// of the caller's token (a single `notifications/cancelled` goes out
    /// and the call fails with `Cancelled`), or deadline expiry (cancelled
    /// with reason `"timeout"`, failing with `Timeout`).
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        check_phase(self.state(), method)?;
        if let Some(caps) = self.peer_capabilities() {
            check_capability(&caps, method)?;
        }
        self.request_inner(method, params, options).await
    }

    async fn request_inner(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let id = RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let (params, progress_token) = match &options.progress {
            Some((token, sink)) => {
                self.inner.progress.register(token.clone(), sink.clone());
                (
                    inject_progress_token(params, token),
                    Some(token.clone()),
                )
            }
            None => (params, None),
        };

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(
            id.clone(),
            PendingRequest {
                responder: tx,
                progress_token: progress_token.clone(),
            },
        );

        let request = JsonRpcRequest::new(method, params, id.clone());
        if let Err(err) = self.write_message(&JsonRpcMessage::Request(request)).await {
            self.remove_pending(&id);
            return Err(err);
        }

        let deadline = options
            .timeout
            .unwrap_or(self.inner.config.default_request_timeout);
        let caller_token = options.cancellation.unwrap_or_default();

        tokio::select! {
            outcome = rx => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::transport("session closed before response")),
            },
            () = tokio::time::sleep(deadline) => {
                self.abandon(&id, Some("timeout".to_string())).await;
                Err(Error::timeout(format!("request {method} timed out after {deadline:?}")))
            }
            () = caller_token.cancelled() => {
                self.abandon(&id, None).await;
                Err(Error::cancelled(format!("request {method} cancelled by caller")))
            }
        }
    }

    /// Abandon a pending request: remove the entry, deregister progress,
    /// and emit `notifications/cancelled` exactly once. Removal of the
    /// pending entry decides the winner, so a racing response suppresses
    /// the emission.
    async fn abandon(&self, id: &RequestId, reason: Option<String>) {
        if self.remove_pending(id) {
            let params = CancelledNotification {
                request_id: id.clone(),
                reason,
            };
            if let Ok(notification) =
                JsonRpcNotification::with_params(methods::NOTIFICATION_CANCELLED, &params)
            {
                if let Err(err) = self.write_notification(notification).await {
                    trace!(%id, %err, "cancelled notification not written");
                }
            }
        }
    }

    fn remove_pending(&self, id: &RequestId) -> bool {
        match self.inner.pending.remove(id) {
            Some((_, pending)) => {
                if let Some(token) = &pending.progress_token {
                    self.inner.progress.deregister(token);
                }
                true
            }
            None => false,
        }
    }

    /// Send a fire-and-forget notification.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        check_phase(self.state(), method)?;
        self.write_notification(JsonRpcNotification::new(method, params))
            .await
    }

    /// Emit `notifications/progress` for a token the peer attached to one of
    /// its requests. Values are forwarded in call order; monotonicity is the
    /// caller's contract.
    pub async fn notify_progress(
        &self,
        token: ProgressToken,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> Result<()> {
        let params = ProgressNotification {
            progress_token: token,
            progress,
            total,
            message,
        };
        self.send_notification(
            methods::NOTIFICATION_PROGRESS,
            Some(serde_json::to_value(&params)?),
        )
        .await
    }

    /// Close the session: fail every pending request, cancel every in-flight
    /// incoming handler, stop the read loop, and disconnect the transport.
    /// Idempotent.
    pub async fn close(&self) {
        if self.inner.termination.is_cancelled() {
            return;
        }
        *self.inner.state.write() = LifecycleState::Closed;
        self.inner.termination.cancel();

        let ids: Vec<RequestId> = self.inner.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, pending)) = self.inner.pending.remove(&id) {
                if let Some(token) = &pending.progress_token {
                    self.inner.progress.deregister(token);
                }
                let _ = pending
                    .responder
                    .send(Err(Error::transport("session closed")));
            }
        }
        self.inner.dispatch.cancel_all_incoming();
        if let Err(err) = self.inner.transport.disconnect().await {
            trace!(%err, "transport disconnect during close");
        }
        debug!("session closed");
    }

    // ------------------------------------------------------------------
    // Wire I/O
    // ------------------------------------------------------------------

    async fn write_message(&self, message: &JsonRpcMessage) -> Result<()> {
        let bytes = message.to_bytes()?;
        self.inner
            .transport
            .send(TransportMessage::new(Bytes::from(bytes)))
            .await
            .map_err(Into::into)
    }

    async fn write_notification(&self, notification: JsonRpcNotification) -> Result<()> {
        self.write_message(&JsonRpcMessage::Notification(notification))
            .await
    }

    async fn write_response(&self, response: JsonRpcResponse) {
        if let Err(err) = self.write_message(&JsonRpcMessage::Response(response)).await {
            trace!(%err, "response not written (transport gone)");
        }
    }

    // ------------------------------------------------------------------
    // Read loop and routing
    // ------------------------------------------------------------------

    fn spawn_read_loop(&self) {
        let session = self.clone();
        tokio::spawn(async move {
            trace!(role = ?session.inner.role, "session read loop started");
            loop {
                tokio::select! {
                    () = session.inner.termination.cancelled() => break,
                    frame = session.inner.transport.receive() => match frame {
                        Ok(Some(message)) => session.route(message).await,
                        Ok(None) => {
                            debug!("peer closed the transport");
                            session.close().await;
                            break;
                        }
                        Err(err) => {
                            error!(%err, "transport failure; session shutting down");
                            session.close().await;
                            break;
                        }
                    }
                }
            }
            trace!("session read loop terminated");
        });
    }

    async fn route(&self, message: TransportMessage) {
        let frame = match JsonRpcMessage::parse(&message.payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "malformed frame");
                self.write_response(JsonRpcResponse::parse_error(err.to_string()))
                    .await;
                return;
            }
        };

        match frame {
            JsonRpcMessage::Response(response) => self.route_response(response),
            JsonRpcMessage::Request(request) => self.route_request(request).await,
            JsonRpcMessage::Notification(notification) => {
                self.route_notification(notification).await;
            }
        }
    }

    fn route_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.as_request_id().cloned() else {
            warn!("response with null id dropped");
            return;
        };
        match self.inner.pending.remove(&id) {
            Some((_, pending)) => {
                if let Some(token) = &pending.progress_token {
                    self.inner.progress.deregister(token);
                }
                let outcome = response.into_result().map_err(Error::from_json_rpc);
                // Receiver dropped means the caller abandoned the request.
                let _ = pending.responder.send(outcome);
            }
            None => {
                trace!(%id, "late response for abandoned request dropped");
            }
        }
    }

    async fn route_request(&self, request: JsonRpcRequest) {
        let JsonRpcRequest {
            method, params, id, ..
        } = request;

        if method == methods::INITIALIZE {
            self.handle_initialize(id, params).await;
            return;
        }
        if let Err(err) = check_phase(self.state(), &method) {
            self.write_response(JsonRpcResponse::error(err.to_json_rpc(), id))
                .await;
            return;
        }
        if method == methods::PING {
            self.write_response(JsonRpcResponse::success(Value::Object(Map::new()), id))
                .await;
            return;
        }

        let Some(handler) = self.inner.dispatch.request_handler(&method) else {
            let err = Error::method_not_found(&method);
            self.write_response(JsonRpcResponse::error(err.to_json_rpc(), id))
                .await;
            return;
        };

        let cancellation = self.inner.dispatch.track_incoming(id.clone(), &method);
        let progress_token = extract_progress_token(params.as_ref());
        let ctx = RequestContext::new(
            self.clone(),
            id.clone(),
            method.clone(),
            progress_token,
            cancellation,
        );

        // Handlers run on worker tasks so a blocking handler never prevents
        // correlation of pending outgoing requests.
        let session = self.clone();
        tokio::spawn(async move {
            let outcome = handler.handle(ctx, params).await;
            session.inner.dispatch.finish_incoming(&id);
            // The response is written even when the peer cancelled and will
            // drop it: JSON-RPC symmetry.
            let response = match outcome {
                Ok(result) => JsonRpcResponse::success(result, id),
                Err(err) => {
                    debug!(%method, %err, "request handler failed");
                    JsonRpcResponse::error(err.to_json_rpc(), id)
                }
            };
            session.write_response(response).await;
        });
    }

    async fn route_notification(&self, notification: JsonRpcNotification) {
        let JsonRpcNotification { method, params, .. } = notification;

        match method.as_str() {
            methods::NOTIFICATION_CANCELLED => {
                match params
                    .map(serde_json::from_value::<CancelledNotification>)
                    .transpose()
                {
                    Ok(Some(cancelled)) => {
                        trace!(id = %cancelled.request_id, reason = ?cancelled.reason, "peer cancelled request");
                        self.inner.dispatch.cancel_incoming(&cancelled.request_id);
                    }
                    Ok(None) | Err(_) => warn!("malformed cancellation notification dropped"),
                }
                return;
            }
            methods::NOTIFICATION_PROGRESS => {
                match params
                    .map(serde_json::from_value::<ProgressNotification>)
                    .transpose()
                {
                    Ok(Some(progress)) => self.inner.progress.dispatch(progress),
                    Ok(None) | Err(_) => warn!("malformed progress notification dropped"),
                }
                return;
            }
            methods::NOTIFICATION_INITIALIZED => {
                if self.inner.role == PeerRole::Server
                    && self.state() == LifecycleState::Initializing
                {
                    *self.inner.state.write() = LifecycleState::Ready;
                    debug!("client confirmed initialization; session ready");
                } else {
                    warn!("unexpected initialized notification dropped");
                }
                // Registered handlers still observe the notification below.
            }
            _ => {
                if let Err(err) = check_phase(self.state(), &method) {
                    warn!(%method, %err, "notification dropped by lifecycle gate");
                    return;
                }
            }
        }

        // Notifications dispatch on their own worker path so a slow handler
        // cannot block response delivery.
        for handler in self.inner.dispatch.notification_handlers(&method) {
            let session = self.clone();
            let params = params.clone();
            tokio::spawn(async move {
                handler.handle(session, params).await;
            });
        }
    }

    async fn handle_initialize(&self, id: RequestId, params: Option<Value>) {
        if self.inner.role != PeerRole::Server {
            let err = Error::invalid_request("initialize sent to a client-role session");
            self.write_response(JsonRpcResponse::error(err.to_json_rpc(), id))
                .await;
            return;
        }
        if self.state() != LifecycleState::Uninitialized {
            let err = Error::invalid_request("session is already initialized");
            self.write_response(JsonRpcResponse::error(err.to_json_rpc(), id))
                .await;
            return;
        }
        let request: InitializeRequest = match params
            .ok_or_else(|| Error::invalid_params("initialize requires params"))
            .and_then(|p| serde_json::from_value(p).map_err(Into::into))
        {
            Ok(request) => request,
            Err(err) => {
                self.write_response(JsonRpcResponse::error(err.to_json_rpc(), id))
                    .await;
                return;
            }
        };

        *self.inner.peer_capabilities.write() =
            Some(PeerCapabilities::Client(request.capabilities.clone()));
        let result = InitializeResult {
            protocol_version: negotiate_protocol_version(&request.protocol_version),
            capabilities: self.inner.options.server_capabilities.clone(),
            server_info: self.inner.options.info.clone(),
            instructions: self.inner.options.instructions.clone(),
        };
        *self.inner.state.write() = LifecycleState::Initializing;
        debug!(client = %request.client_info.name, "initialize answered");
        match serde_json::to_value(&result) {
            Ok(value) => self.write_response(JsonRpcResponse::success(value, id)).await,
            Err(err) => {
                self.write_response(JsonRpcResponse::error(
                    Error::from(err).to_json_rpc(),
                    id,
                ))
                .await;
            }
        }
    }
}

/// Inject the caller's progress token into `params._meta.progressToken`.
fn inject_progress_token(params: Option<Value>, token: &ProgressToken) -> Option<Value> {
    let mut object = match params {
        Some(Value::Object(map)) => map,
        None => Map::new(),
        // Non-object params cannot carry _meta; leave them untouched.
        Some(other) => return Some(other),
    };
    let meta = object
        .entry("_meta")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(meta) = meta {
        if let Ok(value) = serde_json::to_value(token) {
            meta.insert("progressToken".to_string(), value);
        }
    }
    Some(Value::Object(object))
}

/// Read the peer's progress token from `params._meta.progressToken`.
fn extract_progress_token(params: Option<&Value>) -> Option<ProgressToken> {
    let token = params?.get("_meta")?.get("progressToken")?;
    serde_json::from_value(token.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn progress_token_injection_creates_meta() {
        let token = RequestId::from("p1");
        let params = inject_progress_token(None, &token).unwrap();
        assert_eq!(params["_meta"]["progressToken"], serde_json::json!("p1"));
    }

    #[test]
    fn progress_token_injection_preserves_existing_params() {
        let token = RequestId::Number(9);
        let params = inject_progress_token(
            Some(serde_json::json!({"name": "echo", "_meta": {"x": 1}})),
            &token,
        )
        .unwrap();
        assert_eq!(params["name"], "echo");
        assert_eq!(params["_meta"]["x"], 1);
        assert_eq!(params["_meta"]["progressToken"], serde_json::json!(9));
    }

    #[test]
    fn progress_token_extraction_round_trips() {
        let token = RequestId::from("tok");
        let params = inject_progress_token(Some(serde_json::json!({})), &token);
        assert_eq!(extract_progress_token(params.as_ref()), Some(token));
        assert_eq!(extract_progress_token(Some(&serde_json::json!({}))), None);
    }
}
