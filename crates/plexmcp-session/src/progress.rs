//! Progress fan-out.
//!
//! A caller attaches a progress token and a sink to its outgoing request.
//! Inbound `notifications/progress` carrying that token fan out to the sink,
//! in arrival order. Deregistration happens when the pending request is
//! resolved or abandoned.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use plexmcp_protocol::types::ProgressNotification;
use plexmcp_protocol::ProgressToken;

/// Receives progress values for one token, in sender order.
pub trait ProgressSink: Send + Sync {
    /// Called once per inbound progress notification.
    fn on_progress(&self, progress: ProgressNotification);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressNotification) + Send + Sync,
{
    fn on_progress(&self, progress: ProgressNotification) {
        self(progress);
    }
}

/// A sink that forwards into an unbounded channel, for callers that want to
/// consume progress as a stream.
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressNotification>,
}

impl ChannelProgressSink {
    /// Create the sink and its receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_progress(&self, progress: ProgressNotification) {
        // Receiver gone means the caller stopped listening; drop silently.
        let _ = self.tx.send(progress);
    }
}

/// Token → sink registry.
#[derive(Default)]
pub(crate) struct ProgressRegistry {
    sinks: DashMap<ProgressToken, Arc<dyn ProgressSink>>,
}

impl ProgressRegistry {
    pub(crate) fn register(&self, token: ProgressToken, sink: Arc<dyn ProgressSink>) {
        self.sinks.insert(token, sink);
    }

    pub(crate) fn deregister(&self, token: &ProgressToken) {
        self.sinks.remove(token);
    }

    /// Route one inbound progress notification; unknown tokens are dropped.
    pub(crate) fn dispatch(&self, progress: ProgressNotification) {
        if let Some(sink) = self.sinks.get(&progress.progress_token) {
            sink.on_progress(progress);
        } else {
            trace!(token = %progress.progress_token, "progress for unknown token dropped");
        }
    }
}
