//! Full streamable HTTP round trip: client transport against the axum
//! server, with the event store carrying the SSE streams.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use plexmcp_protocol::types::capabilities::ToolsCapability;
use plexmcp_protocol::types::{Implementation, ServerCapabilities};
use plexmcp_protocol::{Error, Result, methods};
use plexmcp_session::{
    LifecycleState, NotificationHandler, PeerRole, RequestContext, RequestHandler, RequestOptions,
    Session, SessionOptions,
};
use plexmcp_streamable::{InMemoryEventStreamStore, StreamableHttpServer, StreamableHttpServerConfig};
use plexmcp_http::StreamableHttpClient;
use plexmcp_transport::TransportConfig;

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

struct Collector {
    received: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl NotificationHandler for Collector {
    async fn handle(&self, _session: Session, params: Option<Value>) {
        self.received.lock().unwrap().push(params.unwrap_or(Value::Null));
    }
}

async fn start_server() -> (Url, Arc<StreamableHttpServer>, Arc<Mutex<Vec<Session>>>) {
    let sessions: Arc<Mutex<Vec<Session>>> = Arc::new(Mutex::new(Vec::new()));
    let sessions_hook = sessions.clone();
    let server = StreamableHttpServer::new(
        Arc::new(InMemoryEventStreamStore::default()),
        SessionOptions {
            info: Implementation {
                name: "http-server".into(),
                title: None,
                version: "0.0.1".into(),
            },
            server_capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                ..Default::default()
            },
            ..Default::default()
        },
        move |session| {
            session.on_request(methods::TOOLS_CALL, Arc::new(EchoHandler));
            sessions_hook.lock().unwrap().push(session.clone());
        },
        StreamableHttpServerConfig {
            keepalive_interval: Duration::from_secs(5),
            ..Default::default()
        },
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    let url = Url::parse(&format!("http://{addr}/")).unwrap();
    (url, server, sessions)
}

async fn connect_client(url: Url) -> (Session, Arc<StreamableHttpClient>) {
    let transport = Arc::new(
        StreamableHttpClient::new(url, TransportConfig::default()).unwrap(),
    );
    let session = Session::connect(
        PeerRole::Client,
        transport.clone(),
        SessionOptions {
            info: Implementation {
                name: "http-client".into(),
                title: None,
                version: "0.0.1".into(),
            },
            ..Default::default()
        },
    );
    (session, transport)
}

#[tokio::test]
async fn initialize_assigns_a_session_and_tool_calls_round_trip() {
    let (url, server, _sessions) = start_server().await;
    let (session, transport) = connect_client(url).await;

    let init = session.initialize().await.unwrap();
    assert!(init.capabilities.supports_tools());
    assert!(transport.session_id().is_some());
    assert_eq!(server.session_count(), 1);

    // The tool response travels back on a per-request SSE stream.
    let result = session
        .send_request(
            methods::TOOLS_CALL,
            Some(json!({"name": "echo", "arguments": {"s": "over http"}})),
            RequestOptions::with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "over http");
}

#[tokio::test]
async fn server_notifications_arrive_on_the_get_stream() {
    let (url, _server, server_sessions) = start_server().await;
    let (session, _transport) = connect_client(url).await;

    let received = Arc::new(Mutex::new(Vec::new()));
    session.on_notification(
        methods::NOTIFICATION_MESSAGE,
        Arc::new(Collector {
            received: received.clone(),
        }),
    );
    session.initialize().await.unwrap();

    let server_session = server_sessions.lock().unwrap()[0].clone();
    // The initialized notification is processed asynchronously server-side.
    tokio::time::timeout(Duration::from_secs(5), async {
        while server_session.state() != LifecycleState::Ready {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("server session never became ready");
    server_session
        .send_notification(
            methods::NOTIFICATION_MESSAGE,
            Some(json!({"level": "info", "data": "hello from the server"})),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !received.lock().unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("notification never reached the client");

    let seen = received.lock().unwrap().clone();
    assert_eq!(seen[0]["data"], "hello from the server");
}

#[tokio::test]
async fn closing_the_client_deletes_the_server_session() {
    let (url, server, _sessions) = start_server().await;
    let (session, _transport) = connect_client(url).await;
    session.initialize().await.unwrap();
    assert_eq!(server.session_count(), 1);

    session.close().await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while server.session_count() != 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("server session was not terminated");
}

#[tokio::test]
async fn concurrent_tool_calls_multiplex_over_one_session() {
    let (url, _server, _sessions) = start_server().await;
    let (session, _transport) = connect_client(url).await;
    session.initialize().await.unwrap();

    let mut joins = Vec::new();
    for i in 0..8 {
        let session = session.clone();
        joins.push(tokio::spawn(async move {
            let result = session
                .send_request(
                    methods::TOOLS_CALL,
                    Some(json!({"name": "echo", "arguments": {"s": format!("call-{i}")}})),
                    RequestOptions::with_timeout(Duration::from_secs(5)),
                )
                .await
                .unwrap();
            assert_eq!(result["content"][0]["text"], json!(format!("call-{i}")));
        }));
    }
    for join in joins {
        join.await.unwrap();
    }
}
