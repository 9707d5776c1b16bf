//! Legacy SSE client transport.
//!
//! The older HTTP pairing: one long-lived GET stream carries inbound frames,
//! and the server's first `endpoint` event names the URL outbound frames are
//! POSTed to. Kept for servers that have not adopted streamable HTTP.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{Mutex as TokioMutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use plexmcp_streamable::sse::SseParser;
use plexmcp_transport::{
    Transport, TransportConfig, TransportError, TransportMessage, TransportResult, TransportState,
};

/// Client side of the legacy SSE transport.
pub struct SseLegacyClient {
    http: reqwest::Client,
    sse_url: Url,
    state: Mutex<TransportState>,
    /// POST target, learned from the server's `endpoint` event.
    endpoint: watch::Receiver<Option<Url>>,
    endpoint_tx: Arc<watch::Sender<Option<Url>>>,
    inbound_rx: TokioMutex<mpsc::UnboundedReceiver<TransportMessage>>,
    inbound_tx: mpsc::UnboundedSender<TransportMessage>,
    closed: CancellationToken,
}

impl std::fmt::Debug for SseLegacyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseLegacyClient")
            .field("sse_url", &self.sse_url.as_str())
            .finish_non_exhaustive()
    }
}

impl SseLegacyClient {
    /// Create a client for a legacy SSE server.
    pub fn new(sse_url: Url, config: TransportConfig) -> TransportResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (endpoint_tx, endpoint) = watch::channel(None);
        Ok(Self {
            http,
            sse_url,
            state: Mutex::new(TransportState::Disconnected),
            endpoint,
            endpoint_tx: Arc::new(endpoint_tx),
            inbound_rx: TokioMutex::new(inbound_rx),
            inbound_tx,
            closed: CancellationToken::new(),
        })
    }

    async fn await_endpoint(&self) -> TransportResult<Url> {
        let mut rx = self.endpoint.clone();
        loop {
            if let Some(url) = rx.borrow().clone() {
                return Ok(url);
            }
            tokio::select! {
                () = self.closed.cancelled() => return Err(TransportError::Closed),
                changed = rx.changed() => {
                    changed.map_err(|_| TransportError::Closed)?;
                }
            }
        }
    }
}

impl Transport for SseLegacyClient {
    fn state(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move { self.state.lock().clone() })
    }

    fn connect(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .http
                .get(self.sse_url.clone())
                .header("Accept", "text/event-stream")
                .send()
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            if !response.status().is_success() {
                return Err(TransportError::ConnectionFailed(format!(
                    "event stream returned {}",
                    response.status()
                )));
            }
            *self.state.lock() = TransportState::Connected;

            let base = self.sse_url.clone();
            let endpoint_tx = self.endpoint_tx.clone();
            let inbound_tx = self.inbound_tx.clone();
            let closed = self.closed.clone();
            tokio::spawn(async move {
                let mut parser = SseParser::new();
                let mut body = response.bytes_stream();
                loop {
                    tokio::select! {
                        () = closed.cancelled() => break,
                        chunk = body.next() => match chunk {
                            Some(Ok(bytes)) => {
                                for frame in parser.feed(&bytes) {
                                    match frame.event.as_deref() {
                                        Some("endpoint") => {
                                            // Relative endpoints resolve against the stream URL.
                                            match base.join(frame.data.trim()) {
                                                Ok(url) => {
                                                    debug!(endpoint = %url, "post endpoint announced");
                                                    let _ = endpoint_tx.send(Some(url));
                                                }
                                                Err(err) => warn!(%err, "unusable endpoint event"),
                                            }
                                        }
                                        None | Some("message") => {
                                            let _ = inbound_tx.send(TransportMessage::new(
                                                Bytes::from(frame.data),
                                            ));
                                        }
                                        Some(other) => {
                                            trace!(event = other, "ignoring SSE event");
                                        }
                                    }
                                }
                            }
                            Some(Err(err)) => {
                                debug!(%err, "event stream interrupted");
                                break;
                            }
                            None => break,
                        }
                    }
                }
                trace!("legacy event stream ended");
            });
            Ok(())
        })
    }

    fn disconnect(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            *self.state.lock() = TransportState::Closed;
            self.closed.cancel();
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
            let endpoint = self.await_endpoint().await?;
            let response = self
                .http
                .post(endpoint)
                .header("Content-Type", "application/json")
                .body(message.payload.to_vec())
                .send()
                .await
                .map_err(|e| TransportError::Http(e.to_string()))?;
            if !response.status().is_success() {
                return Err(TransportError::Http(format!(
                    "POST returned {}",
                    response.status()
                )));
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
        Some(self.sse_url.to_string())
    }
}
