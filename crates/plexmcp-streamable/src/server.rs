//! Streamable HTTP server transport.
//!
//! One POST endpoint accepts a single JSON-RPC message: an `initialize`
//! request (and any request in JSON response mode) is answered with a direct
//! JSON body, any other request opens a per-request SSE stream backed by the
//! event store, and client responses/notifications are accepted with `202`.
//! A GET endpoint opens the session's server→client SSE stream, resuming
//! from `Last-Event-ID`; DELETE terminates the session. `Mcp-Session-Id`
//! carries the session identifier on every request after initialize.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event as SseResponseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use dashmap::DashMap;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{Mutex as TokioMutex, mpsc, oneshot};
use tracing::{debug, trace, warn};

use plexmcp_protocol::jsonrpc::JsonRpcMessage;
use plexmcp_protocol::{RequestId, methods};
use plexmcp_session::{PeerRole, Session, SessionOptions};
use plexmcp_transport::{
    Transport, TransportError, TransportMessage, TransportResult, TransportState,
};

use crate::error::EventStreamError;
use crate::event_id::EventId;
use crate::store::{EventStreamItem, EventStreamStore, EventStreamWriter, StreamMode};

/// Header carrying the session identifier.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";
/// Header carrying the resume position on reconnect.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-Id";
/// Stream hosting server→client traffic (the GET stream).
pub const DEFAULT_STREAM_ID: &str = "events";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct StreamableHttpServerConfig {
    /// SSE keepalive comment interval.
    pub keepalive_interval: Duration,
    /// How long a direct (JSON-mode) POST waits for its response frame.
    pub direct_response_timeout: Duration,
    /// Answer every request with a direct JSON body instead of opening
    /// per-request SSE streams.
    pub json_response_mode: bool,
}

impl Default for StreamableHttpServerConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(15),
            direct_response_timeout: Duration::from_secs(60),
            json_response_mode: false,
        }
    }
}

type ConfigureSession = dyn Fn(&Session) + Send + Sync;

struct SessionEntry {
    session: Session,
    transport: Arc<HttpServerTransport>,
}

/// The streamable HTTP server: a session registry plus the axum handlers.
pub struct StreamableHttpServer {
    store: Arc<dyn EventStreamStore>,
    sessions: DashMap<String, SessionEntry>,
    session_options: SessionOptions,
    configure: Box<ConfigureSession>,
    config: StreamableHttpServerConfig,
}

impl StreamableHttpServer {
    /// Create a server.
    ///
    /// `configure` runs once per new session, before any frame is dispatched;
    /// register request/notification handlers there.
    pub fn new(
        store: Arc<dyn EventStreamStore>,
        session_options: SessionOptions,
        configure: impl Fn(&Session) + Send + Sync + 'static,
        config: StreamableHttpServerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            sessions: DashMap::new(),
            session_options,
            configure: Box::new(configure),
            config,
        })
    }

    /// The axum router serving POST/GET/DELETE on `/`.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", any(dispatch))
            .with_state(self.clone())
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    async fn open_session(&self) -> Result<(String, Arc<HttpServerTransport>), EventStreamError> {
        let session_id = generate_session_id();
        let default_writer = self
            .store
            .create_writer(&session_id, DEFAULT_STREAM_ID, StreamMode::Streaming)
            .await?;
        let transport = Arc::new(HttpServerTransport::new(
            session_id.clone(),
            default_writer.into(),
        ));
        let session = Session::connect(
            PeerRole::Server,
            transport.clone(),
            self.session_options.clone(),
        );
        session.set_session_id(&session_id);
        (self.configure)(&session);
        self.sessions.insert(
            session_id.clone(),
            SessionEntry {
                session,
                transport: transport.clone(),
            },
        );
        debug!(%session_id, "streamable session opened");
        Ok((session_id, transport))
    }

    async fn terminate_session(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, entry)) => {
                entry.session.close().await;
                debug!(%session_id, "streamable session terminated");
                true
            }
            None => false,
        }
    }
}

/// Cryptographically random session identifier, `mcp-` plus 128 bits of hex.
fn generate_session_id() -> String {
    let bytes: [u8; 16] = rand::random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("mcp-{hex}")
}

async fn dispatch(
    state: State<Arc<StreamableHttpServer>>,
    headers: HeaderMap,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    let method = request.method().clone();
    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(body) => body,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    if method == axum::http::Method::POST {
        handle_post(state, headers, body).await
    } else if method == axum::http::Method::GET {
        handle_get(state, headers).await
    } else if method == axum::http::Method::DELETE {
        handle_delete(state, headers).await
    } else {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn handle_post(
    State(server): State<Arc<StreamableHttpServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let frame = match JsonRpcMessage::parse(&body) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%err, "unparseable POST body");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };

    let session_header = header_value(&headers, SESSION_ID_HEADER);
    let is_initialize =
        matches!(&frame, JsonRpcMessage::Request(r) if r.method == methods::INITIALIZE);

    // Resolve (or create, for initialize) the session.
    let (session_id, transport, created) = if is_initialize && session_header.is_none() {
        match server.open_session().await {
            Ok((id, transport)) => (id, transport, true),
            Err(err) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
            }
        }
    } else {
        let Some(id) = session_header else {
            return (
                StatusCode::BAD_REQUEST,
                format!("missing {SESSION_ID_HEADER} header"),
            )
                .into_response();
        };
        let Some(entry) = server.sessions.get(&id) else {
            return StatusCode::NOT_FOUND.into_response();
        };
        (id, entry.transport.clone(), false)
    };

    match frame {
        JsonRpcMessage::Request(request) => {
            let id = request.id.clone();
            let direct = created || server.config.json_response_mode;
            if direct {
                let rx = transport.register_direct(id.clone());
                transport.push_inbound(body);
                match tokio::time::timeout(server.config.direct_response_timeout, rx).await {
                    Ok(Ok(response_bytes)) => json_response(&session_id, response_bytes),
                    Ok(Err(_)) | Err(_) => {
                        transport.forget_direct(&id);
                        StatusCode::GATEWAY_TIMEOUT.into_response()
                    }
                }
            } else {
                // Per-request SSE stream: the response frame lands on its own
                // resumable stream.
                let stream_id = request_stream_id(&id);
                let writer = match server
                    .store
                    .create_writer(&session_id, &stream_id, StreamMode::Streaming)
                    .await
                {
                    Ok(writer) => writer,
                    Err(err) => {
                        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                            .into_response();
                    }
                };
                transport.register_stream(id, writer.into());
                transport.push_inbound(body);

                let resume = EventId::new(&session_id, &stream_id, 0).encode();
                match server.store.get_reader(&resume).await {
                    Some(reader) => sse_response(&server, &session_id, reader),
                    None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                }
            }
        }
        JsonRpcMessage::Response(_) | JsonRpcMessage::Notification(_) => {
            transport.push_inbound(body);
            (StatusCode::ACCEPTED, session_id_header(&session_id)).into_response()
        }
    }
}

async fn handle_get(
    State(server): State<Arc<StreamableHttpServer>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = header_value(&headers, SESSION_ID_HEADER) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("missing {SESSION_ID_HEADER} header"),
        )
            .into_response();
    };
    if !server.sessions.contains_key(&session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let resume = header_value(&headers, LAST_EVENT_ID_HEADER)
        .unwrap_or_else(|| EventId::new(&session_id, DEFAULT_STREAM_ID, 0).encode());
    match server.store.get_reader(&resume).await {
        Some(reader) => sse_response(&server, &session_id, reader),
        None => (
            StatusCode::BAD_REQUEST,
            "unknown or unparseable resume position",
        )
            .into_response(),
    }
}

async fn handle_delete(
    State(server): State<Arc<StreamableHttpServer>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = header_value(&headers, SESSION_ID_HEADER) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if server.terminate_session(&session_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

fn session_id_header(session_id: &str) -> [(&'static str, String); 1] {
    [(SESSION_ID_HEADER, session_id.to_string())]
}

fn json_response(session_id: &str, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE.as_str(), "application/json".to_string()),
            (SESSION_ID_HEADER, session_id.to_string()),
        ],
        body,
    )
        .into_response()
}

fn sse_response(
    server: &Arc<StreamableHttpServer>,
    session_id: &str,
    reader: Box<dyn crate::store::EventStreamReader>,
) -> Response {
    let stream = event_stream(reader);
    let sse = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(server.config.keepalive_interval));
    ([(SESSION_ID_HEADER, session_id.to_string())], sse).into_response()
}

/// Adapt a store reader into the SSE response stream. Reader errors surface
/// as a final `error`-typed event so the peer knows to restart rather than
/// resume.
fn event_stream(
    reader: Box<dyn crate::store::EventStreamReader>,
) -> Pin<Box<dyn Stream<Item = Result<SseResponseEvent, std::convert::Infallible>> + Send>> {
    Box::pin(futures::stream::unfold(
        (reader, false),
        |(mut reader, failed)| async move {
            if failed {
                return None;
            }
            match reader.next_event().await {
                Ok(Some(item)) => {
                    let mut event = SseResponseEvent::default()
                        .id(item.event_id)
                        .data(item.data);
                    if let Some(event_type) = item.event_type {
                        event = event.event(event_type);
                    }
                    if let Some(retry) = item.reconnection_interval {
                        event = event.retry(retry);
                    }
                    Some((Ok(event), (reader, false)))
                }
                Ok(None) => None,
                Err(err) => {
                    let event = SseResponseEvent::default()
                        .event("error")
                        .data(err.to_string());
                    Some((Ok(event), (reader, true)))
                }
            }
        },
    ))
}

/// Stream id hosting the response of one POSTed request.
fn request_stream_id(id: &RequestId) -> String {
    match id {
        RequestId::String(s) => format!("req:s:{s}"),
        RequestId::Number(n) => format!("req:n:{n}"),
    }
}

enum OutboundRoute {
    Direct(oneshot::Sender<Vec<u8>>),
    Stream(Arc<dyn EventStreamWriter>),
}

/// Transport backing one server session: inbound frames arrive from POST
/// bodies; outbound frames route to the waiting POST (direct responses), the
/// request's own stream, or the default server→client stream.
pub struct HttpServerTransport {
    session_id: String,
    state: Mutex<TransportState>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<TransportMessage>>>,
    inbound_rx: TokioMutex<mpsc::UnboundedReceiver<TransportMessage>>,
    routes: DashMap<RequestId, OutboundRoute>,
    default_writer: Arc<dyn EventStreamWriter>,
}

impl std::fmt::Debug for HttpServerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServerTransport")
            .field("session_id", &self.session_id)
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

impl HttpServerTransport {
    fn new(session_id: String, default_writer: Arc<dyn EventStreamWriter>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session_id,
            state: Mutex::new(TransportState::Connected),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: TokioMutex::new(rx),
            routes: DashMap::new(),
            default_writer,
        }
    }

    fn push_inbound(&self, body: Bytes) {
        if let Some(tx) = self.inbound_tx.lock().as_ref() {
            let _ = tx.send(TransportMessage::new(body));
        }
    }

    fn register_direct(&self, id: RequestId) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.routes.insert(id, OutboundRoute::Direct(tx));
        rx
    }

    fn register_stream(&self, id: RequestId, writer: Arc<dyn EventStreamWriter>) {
        self.routes.insert(id, OutboundRoute::Stream(writer));
    }

    fn forget_direct(&self, id: &RequestId) {
        self.routes.remove(id);
    }
}

impl Transport for HttpServerTransport {
    fn state(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move { self.state.lock().clone() })
    }

    fn connect(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }

    fn disconnect(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            *self.state.lock() = TransportState::Closed;
            // Dropping the sender ends the session's read loop cleanly.
            self.inbound_tx.lock().take();
            let _ = self.default_writer.dispose().await;
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            // Responses peel off to the route registered when their request
            // arrived; everything else rides the default stream.
            if let Ok(JsonRpcMessage::Response(response)) =
                JsonRpcMessage::parse(&message.payload)
            {
                if let Some(id) = response.id.as_request_id() {
                    if let Some((_, route)) = self.routes.remove(id) {
                        match route {
                            OutboundRoute::Direct(tx) => {
                                let _ = tx.send(message.payload.to_vec());
                                return Ok(());
                            }
                            OutboundRoute::Stream(writer) => {
                                let data =
                                    String::from_utf8_lossy(&message.payload).into_owned();
                                writer
                                    .write_event(EventStreamItem::data(data))
                                    .await
                                    .map_err(|e| TransportError::Http(e.to_string()))?;
                                let _ = writer.dispose().await;
                                return Ok(());
                            }
                        }
                    }
                    trace!(%id, "response without a live route; using default stream");
                }
            }
            let data = String::from_utf8_lossy(&message.payload).into_owned();
            self.default_writer
                .write_event(EventStreamItem::data(data))
                .await
                .map_err(|e| TransportError::Http(e.to_string()))?;
            Ok(())
        })
    }

    fn receive(
        &self,
    ) -> Pin<
        Box<
            dyn std::future::Future<Output = TransportResult<Option<TransportMessage>>>
                + Send
                + '_,
        >,
    > {
        Box::pin(async move {
            let mut rx = self.inbound_rx.lock().await;
            Ok(rx.recv().await)
        })
    }

    fn endpoint(&self) -> Option<String> {
        Some(format!("streamable-http:{}", self.session_id))
    }
}
