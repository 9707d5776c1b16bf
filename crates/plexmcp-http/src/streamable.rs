//! Streamable HTTP client transport.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use plexmcp_streamable::server::{LAST_EVENT_ID_HEADER, SESSION_ID_HEADER};
use plexmcp_streamable::sse::SseParser;
use plexmcp_transport::{
    Transport, TransportConfig, TransportError, TransportMessage, TransportResult, TransportState,
};

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

struct Shared {
    inbound_tx: mpsc::UnboundedSender<TransportMessage>,
    session_id: RwLock<Option<String>>,
    last_event_id: RwLock<Option<String>>,
    closed: CancellationToken,
}

impl Shared {
    /// Feed one SSE frame into the inbound queue, remembering its id for
    /// reconnection.
    fn accept_sse_frame(&self, frame: plexmcp_streamable::sse::SseFrame) {
        if let Some(id) = &frame.id {
            *self.last_event_id.write() = Some(id.clone());
        }
        match frame.event.as_deref() {
            None | Some("message") => {
                let _ = self
                    .inbound_tx
                    .send(TransportMessage::new(Bytes::from(frame.data)));
            }
            Some("error") => {
                warn!(detail = %frame.data, "server signalled a stream error; a fresh stream is required");
            }
            Some(other) => trace!(event = other, "ignoring non-message SSE event"),
        }
    }
}

/// Client side of the streamable HTTP transport.
pub struct StreamableHttpClient {
    http: reqwest::Client,
    endpoint: Url,
    config: TransportConfig,
    state: Mutex<TransportState>,
    shared: Arc<Shared>,
    inbound_rx: TokioMutex<mpsc::UnboundedReceiver<TransportMessage>>,
    listener_started: Mutex<bool>,
}

impl std::fmt::Debug for StreamableHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("session_id", &*self.shared.session_id.read())
            .finish_non_exhaustive()
    }
}

impl StreamableHttpClient {
    /// Create a client for the given MCP endpoint.
    pub fn new(endpoint: Url, config: TransportConfig) -> TransportResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            http,
            endpoint,
            config,
            state: Mutex::new(TransportState::Connected),
            shared: Arc::new(Shared {
                inbound_tx,
                session_id: RwLock::new(None),
                last_event_id: RwLock::new(None),
                closed: CancellationToken::new(),
            }),
            inbound_rx: TokioMutex::new(inbound_rx),
            listener_started: Mutex::new(false),
        })
    }

    /// The session id assigned by the server, once initialize completed.
    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.read().clone()
    }

    fn capture_session_id(&self, response: &reqwest::Response) {
        if let Some(value) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut slot = self.shared.session_id.write();
            if slot.as_deref() != Some(value) {
                debug!(session_id = value, "session id assigned");
                *slot = Some(value.to_string());
            }
        }
    }

    /// Open the GET listener stream for server→client traffic. Reconnects
    /// with `Last-Event-ID` until the transport closes.
    fn ensure_listener(&self) {
        let mut started = self.listener_started.lock();
        if *started || self.shared.session_id.read().is_none() {
            return;
        }
        *started = true;

        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let shared = self.shared.clone();
        let reconnect_delay = self.config.reconnect_delay;
        tokio::spawn(async move {
            loop {
                if shared.closed.is_cancelled() {
                    break;
                }
                let Some(session_id) = shared.session_id.read().clone() else {
                    break;
                };
                let mut request = http
                    .get(endpoint.clone())
                    .header("Accept", "text/event-stream")
                    .header(SESSION_ID_HEADER, &session_id);
                if let Some(last) = shared.last_event_id.read().clone() {
                    request = request.header(LAST_EVENT_ID_HEADER, last);
                }

                match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        let mut parser = SseParser::new();
                        let mut body = response.bytes_stream();
                        loop {
                            tokio::select! {
                                () = shared.closed.cancelled() => return,
                                chunk = body.next() => match chunk {
                                    Some(Ok(bytes)) => {
                                        for frame in parser.feed(&bytes) {
                                            shared.accept_sse_frame(frame);
                                        }
                                    }
                                    Some(Err(err)) => {
                                        debug!(%err, "listener stream interrupted");
                                        break;
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                    Ok(response) => {
                        debug!(status = %response.status(), "listener stream refused");
                    }
                    Err(err) => {
                        debug!(%err, "listener connect failed");
                    }
                }
                tokio::select! {
                    () = shared.closed.cancelled() => break,
                    () = tokio::time::sleep(reconnect_delay) => {}
                }
            }
            trace!("listener stream stopped");
        });
    }

    async fn consume_sse_body(&self, response: reqwest::Response) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for frame in parser.feed(&bytes) {
                            shared.accept_sse_frame(frame);
                        }
                    }
                    Err(err) => {
                        debug!(%err, "response stream interrupted");
                        break;
                    }
                }
            }
        });
    }
}

impl Transport for StreamableHttpClient {
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
            self.shared.closed.cancel();
            // Best-effort session termination on the server.
            let session_id = self.shared.session_id.read().clone();
            if let Some(session_id) = session_id {
                let _ = self
                    .http
                    .delete(self.endpoint.clone())
                    .header(SESSION_ID_HEADER, session_id)
                    .send()
                    .await;
            }
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if *self.state.lock() != TransportState::Connected {
                return Err(TransportError::NotConnected);
            }
            let mut request = self
                .http
                .post(self.endpoint.clone())
                .header("Content-Type", "application/json")
                .header("Accept", ACCEPT_BOTH)
                .body(message.payload.to_vec());
            if let Some(session_id) = self.shared.session_id.read().clone() {
                request = request.header(SESSION_ID_HEADER, session_id);
            }

            let response = request
                .send()
                .await
                .map_err(|e| TransportError::Http(e.to_string()))?;
            self.capture_session_id(&response);
            self.ensure_listener();

            let status = response.status();
            if status == reqwest::StatusCode::ACCEPTED {
                return Ok(());
            }
            if !status.is_success() {
                return Err(TransportError::Http(format!(
                    "POST returned {status}"
                )));
            }

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if content_type.starts_with("text/event-stream") {
                self.consume_sse_body(response).await;
            } else {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| TransportError::Http(e.to_string()))?;
                if !body.is_empty() {
                    let _ = self.shared.inbound_tx.send(TransportMessage::new(body));
                }
            }
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
        Some(self.endpoint.to_string())
    }
}
