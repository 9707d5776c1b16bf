//! Handler traits and the incoming-request tracker.
//!
//! One request handler per method; any number of notification handlers per
//! method. A request handler receives a [`RequestContext`] whose cancellation
//! token is tripped by the peer's `notifications/cancelled`; the handler runs
//! to completion at its own pace, and the response it produces is still
//! written for JSON-RPC symmetry even when the issuer will drop it.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use plexmcp_protocol::types::Timestamp;
use plexmcp_protocol::{ProgressToken, RequestId, Result};

use crate::session::Session;

/// Handles one inbound request method.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the result value for a request, or an error to send back.
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> Result<Value>;
}

/// Handles one inbound notification method.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// React to a notification. Failures are logged, never surfaced.
    async fn handle(&self, session: Session, params: Option<Value>);
}

/// Context handed to a request handler.
///
/// Cloneable and cheap; carries the session for reentrant calls, the
/// request's identity, and the peer-cancellation token.
#[derive(Clone)]
pub struct RequestContext {
    session: Session,
    request_id: RequestId,
    method: String,
    progress_token: Option<ProgressToken>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub(crate) fn new(
        session: Session,
        request_id: RequestId,
        method: String,
        progress_token: Option<ProgressToken>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            session,
            request_id,
            method,
            progress_token,
            cancellation,
        }
    }

    /// The session this request arrived on; handlers may issue further
    /// requests through it before returning.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Id of the request being handled.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Method being handled.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Token tripped when the peer cancels this request.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// True once the peer has cancelled this request.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The caller's progress token, when the request carried one.
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    /// Emit `notifications/progress` against the caller's token.
    ///
    /// A no-op when the request carried no token.
    pub async fn notify_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> Result<()> {
        match &self.progress_token {
            Some(token) => {
                self.session
                    .notify_progress(token.clone(), progress, total, message)
                    .await
            }
            None => Ok(()),
        }
    }
}

/// One tracked inbound request.
pub(crate) struct IncomingRequest {
    pub(crate) cancellation: CancellationToken,
    #[allow(dead_code)]
    pub(crate) method: String,
    #[allow(dead_code)]
    pub(crate) created_at: Timestamp,
}

/// Registry of handlers plus the incoming-request tracker.
#[derive(Default)]
pub(crate) struct DispatchTable {
    requests: DashMap<String, Arc<dyn RequestHandler>>,
    notifications: DashMap<String, Vec<Arc<dyn NotificationHandler>>>,
    incoming: DashMap<RequestId, IncomingRequest>,
}

impl DispatchTable {
    pub(crate) fn set_request_handler(&self, method: &str, handler: Arc<dyn RequestHandler>) {
        self.requests.insert(method.to_string(), handler);
    }

    pub(crate) fn add_notification_handler(
        &self,
        method: &str,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.notifications
            .entry(method.to_string())
            .or_default()
            .push(handler);
    }

    pub(crate) fn request_handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.requests.get(method).map(|h| h.value().clone())
    }

    pub(crate) fn notification_handlers(
        &self,
        method: &str,
    ) -> Vec<Arc<dyn NotificationHandler>> {
        self.notifications
            .get(method)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    /// Track an inbound request; its token is tripped by a matching
    /// `notifications/cancelled`.
    pub(crate) fn track_incoming(&self, id: RequestId, method: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.incoming.insert(
            id,
            IncomingRequest {
                cancellation: token.clone(),
                method: method.to_string(),
                created_at: Timestamp::now(),
            },
        );
        token
    }

    pub(crate) fn finish_incoming(&self, id: &RequestId) {
        self.incoming.remove(id);
    }

    /// Trip the cancellation of a tracked inbound request.
    pub(crate) fn cancel_incoming(&self, id: &RequestId) {
        if let Some(entry) = self.incoming.get(id) {
            entry.cancellation.cancel();
        } else {
            trace!(%id, "cancellation for unknown or finished request");
        }
    }

    /// Trip every tracked inbound request (session termination).
    pub(crate) fn cancel_all_incoming(&self) {
        for entry in self.incoming.iter() {
            entry.cancellation.cancel();
        }
    }
}
