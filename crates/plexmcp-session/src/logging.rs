//! Protocol-level logging: `logging/setLevel` and `notifications/message`.
//!
//! A server session that advertises the logging capability attaches an
//! [`McpLogger`]; the client's `logging/setLevel` moves the threshold and
//! [`McpLogger::emit`] forwards only messages at or above it.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

use plexmcp_protocol::types::{LoggingLevel, LoggingMessageNotification, SetLevelRequest};
use plexmcp_protocol::{Error, Result, methods};

use crate::handlers::{RequestContext, RequestHandler};
use crate::session::Session;

/// Per-session log-level gate and emission helper.
#[derive(Clone)]
pub struct McpLogger {
    minimum: Arc<RwLock<LoggingLevel>>,
}

impl McpLogger {
    /// Create a logger and register its `logging/setLevel` handler on the
    /// session. The threshold starts at `info`.
    pub fn attach(session: &Session) -> Self {
        let logger = Self {
            minimum: Arc::new(RwLock::new(LoggingLevel::Info)),
        };
        session.on_request(
            methods::LOGGING_SET_LEVEL,
            Arc::new(SetLevelHandler {
                minimum: logger.minimum.clone(),
            }),
        );
        logger
    }

    /// The current threshold.
    pub fn level(&self) -> LoggingLevel {
        *self.minimum.read()
    }

    /// Send `notifications/message` when `level` clears the threshold.
    /// Messages below it are dropped without touching the wire.
    pub async fn emit(
        &self,
        session: &Session,
        level: LoggingLevel,
        logger: Option<String>,
        data: Value,
    ) -> Result<()> {
        if !self.level().allows(level) {
            trace!(?level, "log message below client threshold dropped");
            return Ok(());
        }
        let params = LoggingMessageNotification {
            level,
            logger,
            data,
        };
        session
            .send_notification(
                methods::NOTIFICATION_MESSAGE,
                Some(serde_json::to_value(&params)?),
            )
            .await
    }
}

struct SetLevelHandler {
    minimum: Arc<RwLock<LoggingLevel>>,
}

#[async_trait]
impl RequestHandler for SetLevelHandler {
    async fn handle(&self, _ctx: RequestContext, params: Option<Value>) -> Result<Value> {
        let request: SetLevelRequest = params
            .ok_or_else(|| Error::invalid_params("logging/setLevel requires params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| Error::invalid_params(e.to_string()))
            })?;
        *self.minimum.write() = request.level;
        Ok(Value::Object(serde_json::Map::new()))
    }
}
