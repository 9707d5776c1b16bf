//! End-to-end session tests over an in-memory pipe pair.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use plexmcp_protocol::types::capabilities::{
    RootsCapability, SamplingCapability, ToolsCapability,
};
use plexmcp_protocol::types::{ClientCapabilities, Implementation, ServerCapabilities};
use plexmcp_protocol::{Error, ErrorKind, RequestId, Result, methods};
use plexmcp_session::{
    ChannelProgressSink, NotificationHandler, PeerRole, RequestContext, RequestHandler,
    RequestOptions, Session, SessionOptions,
};
use plexmcp_stdio::duplex_pair;
use plexmcp_transport::TransportConfig;

fn client_options() -> SessionOptions {
    SessionOptions {
        info: Implementation {
            name: "loopback-client".into(),
            title: None,
            version: "0.0.1".into(),
        },
        client_capabilities: ClientCapabilities {
            sampling: Some(SamplingCapability::default()),
            roots: Some(RootsCapability::default()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn server_options() -> SessionOptions {
    SessionOptions {
        info: Implementation {
            name: "loopback-server".into(),
            title: None,
            version: "0.0.1".into(),
        },
        server_capabilities: ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Connect a client/server pair over an in-memory duplex and run initialize.
async fn connected_pair() -> (Session, Session) {
    let (client_side, server_side) = duplex_pair(TransportConfig::default());
    let server = Session::connect(
        PeerRole::Server,
        Arc::new(server_side),
        server_options(),
    );
    let client = Session::connect(
        PeerRole::Client,
        Arc::new(client_side),
        client_options(),
    );
    (client, server)
}

struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle(&self, _ctx: RequestContext, params: Option<Value>) -> Result<Value> {
        let s = params
            .as_ref()
            .and_then(|p| p.get("arguments"))
            .and_then(|a| a.get("s"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_params("missing argument `s`"))?;
        Ok(json!({"content": [{"type": "text", "text": s}]}))
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let (client, server) = connected_pair().await;
    server.on_request(methods::TOOLS_CALL, Arc::new(EchoHandler));

    let init = client.initialize().await.unwrap();
    assert!(init.capabilities.supports_tools());

    let result = client
        .send_request(
            methods::TOOLS_CALL,
            Some(json!({"name": "echo", "arguments": {"s": "hi"}})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "hi");

    client.close().await;
}

struct ProgressiveHandler;

#[async_trait]
impl RequestHandler for ProgressiveHandler {
    async fn handle(&self, ctx: RequestContext, _params: Option<Value>) -> Result<Value> {
        for step in 1..=3 {
            ctx.notify_progress(f64::from(step), Some(3.0), None).await?;
        }
        Ok(json!({"done": true}))
    }
}

#[tokio::test]
async fn progress_values_arrive_in_order_before_the_result() {
    let (client, server) = connected_pair().await;
    server.on_request(methods::TOOLS_CALL, Arc::new(ProgressiveHandler));
    client.initialize().await.unwrap();

    let (sink, mut rx) = ChannelProgressSink::new();
    let options = RequestOptions {
        progress: Some((RequestId::from("p1"), Arc::new(sink))),
        ..Default::default()
    };
    let result = client
        .send_request(
            methods::TOOLS_CALL,
            Some(json!({"name": "count", "arguments": {}})),
            options,
        )
        .await
        .unwrap();
    assert_eq!(result["done"], true);

    let mut seen = Vec::new();
    while let Ok(p) = rx.try_recv() {
        seen.push(p.progress);
    }
    assert_eq!(seen, vec![1.0, 2.0, 3.0]);
}

struct HangUntilCancelled {
    observed_cancel: Arc<AtomicUsize>,
}

#[async_trait]
impl RequestHandler for HangUntilCancelled {
    async fn handle(&self, ctx: RequestContext, _params: Option<Value>) -> Result<Value> {
        ctx.cancellation().cancelled().await;
        self.observed_cancel.fetch_add(1, Ordering::SeqCst);
        Err(Error::cancelled("work abandoned"))
    }
}

#[tokio::test]
async fn caller_cancellation_emits_one_wire_notification() {
    let (client, server) = connected_pair().await;
    let observed = Arc::new(AtomicUsize::new(0));
    server.on_request(
        methods::TOOLS_CALL,
        Arc::new(HangUntilCancelled {
            observed_cancel: observed.clone(),
        }),
    );
    client.initialize().await.unwrap();

    let cancel = CancellationToken::new();
    let options = RequestOptions {
        cancellation: Some(cancel.clone()),
        ..Default::default()
    };
    let call = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .send_request(
                    methods::TOOLS_CALL,
                    Some(json!({"name": "slow", "arguments": {}})),
                    options,
                )
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);

    // The wire notification trips the handler's context on the server side.
    tokio::time::timeout(Duration::from_secs(1), async {
        while observed.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("server handler never observed the cancellation");
}

#[tokio::test]
async fn deadline_expiry_fails_with_timeout() {
    let (client, server) = connected_pair().await;
    server.on_request(
        methods::TOOLS_CALL,
        Arc::new(HangUntilCancelled {
            observed_cancel: Arc::new(AtomicUsize::new(0)),
        }),
    );
    client.initialize().await.unwrap();

    let err = client
        .send_request(
            methods::TOOLS_CALL,
            Some(json!({"name": "slow", "arguments": {}})),
            RequestOptions::with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
}

/// A tool handler that calls back into the client mid-execution.
struct ReentrantHandler;

#[async_trait]
impl RequestHandler for ReentrantHandler {
    async fn handle(&self, ctx: RequestContext, _params: Option<Value>) -> Result<Value> {
        let sampled = ctx
            .session()
            .send_request(
                methods::SAMPLING_CREATE_MESSAGE,
                Some(json!({"messages": [], "maxTokens": 8})),
                RequestOptions::default(),
            )
            .await?;
        Ok(json!({"model": sampled["model"]}))
    }
}

struct CannedSampling;

#[async_trait]
impl RequestHandler for CannedSampling {
    async fn handle(&self, _ctx: RequestContext, _params: Option<Value>) -> Result<Value> {
        Ok(json!({
            "role": "assistant",
            "content": {"type": "text", "text": "ok"},
            "model": "test-model"
        }))
    }
}

#[tokio::test]
async fn server_to_client_request_during_handler_execution() {
    let (client, server) = connected_pair().await;
    server.on_request(methods::TOOLS_CALL, Arc::new(ReentrantHandler));
    client.on_request(methods::SAMPLING_CREATE_MESSAGE, Arc::new(CannedSampling));
    client.initialize().await.unwrap();

    let result = client
        .send_request(
            methods::TOOLS_CALL,
            Some(json!({"name": "needs_sampling", "arguments": {}})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result["model"], "test-model");
}

#[tokio::test]
async fn uninitialized_session_refuses_feature_requests() {
    let (client, _server) = connected_pair().await;
    let err = client
        .send_request(
            methods::TOOLS_CALL,
            Some(json!({"name": "echo"})),
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lifecycle);
}

#[tokio::test]
async fn missing_capability_fails_locally() {
    let (client, _server) = connected_pair().await;
    client.initialize().await.unwrap();

    // The loopback server never advertises prompts.
    let err = client
        .send_request(methods::PROMPTS_LIST, None, RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapabilityNotSupported);
}

#[tokio::test]
async fn unknown_method_yields_method_not_found() {
    let (client, _server) = connected_pair().await;
    client.initialize().await.unwrap();

    let err = client
        .send_request(methods::TOOLS_LIST, None, RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::MethodNotFound);
}

#[tokio::test]
async fn ping_is_built_in() {
    let (client, _server) = connected_pair().await;
    client.initialize().await.unwrap();
    let pong = client
        .send_request(methods::PING, None, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(pong, json!({}));
}

#[tokio::test]
async fn concurrent_requests_resolve_independently() {
    let (client, server) = connected_pair().await;
    server.on_request(methods::TOOLS_CALL, Arc::new(EchoHandler));
    client.initialize().await.unwrap();

    let mut joins = Vec::new();
    for i in 0..16 {
        let client = client.clone();
        joins.push(tokio::spawn(async move {
            let text = format!("msg-{i}");
            let result = client
                .send_request(
                    methods::TOOLS_CALL,
                    Some(json!({"name": "echo", "arguments": {"s": text}})),
                    RequestOptions::default(),
                )
                .await
                .unwrap();
            assert_eq!(result["content"][0]["text"], json!(format!("msg-{i}")));
        }));
    }
    for join in joins {
        join.await.unwrap();
    }
}

#[tokio::test]
async fn set_level_gates_log_notifications() {
    use plexmcp_protocol::types::LoggingLevel;
    use plexmcp_protocol::types::capabilities::LoggingCapability;
    use plexmcp_session::McpLogger;

    let (client_side, server_side) = duplex_pair(TransportConfig::default());
    let server = Session::connect(
        PeerRole::Server,
        Arc::new(server_side),
        SessionOptions {
            server_capabilities: ServerCapabilities {
                logging: Some(LoggingCapability::default()),
                ..Default::default()
            },
            ..Default::default()
        },
    );
    let logger = McpLogger::attach(&server);
    let client = Session::connect(
        PeerRole::Client,
        Arc::new(client_side),
        SessionOptions::default(),
    );

    let delivered = Arc::new(AtomicUsize::new(0));
    client.on_notification(
        methods::NOTIFICATION_MESSAGE,
        Arc::new(CountingNotificationHandler {
            count: delivered.clone(),
        }),
    );
    client.initialize().await.unwrap();

    client
        .send_request(
            methods::LOGGING_SET_LEVEL,
            Some(json!({"level": "warning"})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(logger.level(), LoggingLevel::Warning);

    // Below the threshold: dropped before the wire.
    logger
        .emit(&server, LoggingLevel::Info, None, json!("quiet"))
        .await
        .unwrap();
    // At the threshold and above: delivered.
    logger
        .emit(
            &server,
            LoggingLevel::Error,
            Some("worker".into()),
            json!("loud"),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        while delivered.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("error-level message never arrived");
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

struct CountingNotificationHandler {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl NotificationHandler for CountingNotificationHandler {
    async fn handle(&self, _session: Session, _params: Option<Value>) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn notifications_fan_out_to_every_registered_handler() {
    let (client, server) = connected_pair().await;
    let count = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        server.on_notification(
            methods::NOTIFICATION_ROOTS_LIST_CHANGED,
            Arc::new(CountingNotificationHandler {
                count: count.clone(),
            }),
        );
    }
    client.initialize().await.unwrap();

    client
        .send_notification(methods::NOTIFICATION_ROOTS_LIST_CHANGED, None)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        while count.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("notification handlers never ran");
}
