//! Task coordinator scenarios over an in-memory session pair.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use plexmcp_protocol::types::capabilities::{SamplingCapability, TasksCapability, ToolsCapability};
use plexmcp_protocol::types::{
    ClientCapabilities, Implementation, ServerCapabilities, TaskStatus, TaskSupport,
};
use plexmcp_protocol::{Error, ErrorKind, Result, methods, types::tasks::task_metadata_from_params};
use plexmcp_session::{
    NotificationHandler, PeerRole, RequestContext, RequestHandler, RequestOptions, Session,
    SessionOptions,
};
use plexmcp_stdio::duplex_pair;
use plexmcp_tasks::{InMemoryTaskStore, TaskCoordinator, TaskStoreConfig};
use plexmcp_transport::TransportConfig;

fn session_pair() -> (Session, Session) {
    let (client_side, server_side) = duplex_pair(TransportConfig::default());
    let server = Session::connect(
        PeerRole::Server,
        Arc::new(server_side),
        SessionOptions {
            info: Implementation {
                name: "task-server".into(),
                title: None,
                version: "0.0.1".into(),
            },
            server_capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                tasks: Some(TasksCapability {
                    list: Some(true),
                    cancel: Some(true),
                }),
                ..Default::default()
            },
            ..Default::default()
        },
    );
    let client = Session::connect(
        PeerRole::Client,
        Arc::new(client_side),
        SessionOptions {
            info: Implementation {
                name: "task-client".into(),
                title: None,
                version: "0.0.1".into(),
            },
            client_capabilities: ClientCapabilities {
                sampling: Some(SamplingCapability { tasks: Some(true) }),
                ..Default::default()
            },
            ..Default::default()
        },
    );
    (client, server)
}

/// A `tools/call` handler that admits task-augmented calls.
struct TaskAwareTool {
    coordinator: Arc<TaskCoordinator>,
    /// What the background execution does, selected by tool name.
    behavior: Behavior,
}

#[derive(Clone, Copy)]
enum Behavior {
    /// Sleep briefly, then produce a text result.
    Complete,
    /// Wait for cancellation.
    Hang,
    /// Issue a nested sampling call under input_required.
    NeedsInput,
    /// Fail with an error.
    Fail,
}

#[async_trait]
impl RequestHandler for TaskAwareTool {
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> Result<Value> {
        let Some(metadata) = task_metadata_from_params(params.as_ref()) else {
            return Err(Error::invalid_params("this test tool only runs as a task"));
        };
        let behavior = self.behavior;
        let session = ctx.session().clone();
        self.coordinator
            .admit(
                &ctx,
                "tool",
                TaskSupport::Optional,
                &metadata,
                params.unwrap_or(Value::Null),
                Box::new(move |handle| {
                    Box::pin(async move {
                        match behavior {
                            Behavior::Complete => {
                                tokio::time::sleep(Duration::from_millis(30)).await;
                                Ok(json!({"content": [{"type": "text", "text": "task done"}]}))
                            }
                            Behavior::Hang => {
                                handle.cancellation().cancelled().await;
                                Err(Error::cancelled("hang tool cancelled"))
                            }
                            Behavior::NeedsInput => {
                                let sampled = handle
                                    .input_required_scope(session.send_request(
                                        methods::SAMPLING_CREATE_MESSAGE,
                                        Some(json!({"messages": [], "maxTokens": 4})),
                                        RequestOptions::default(),
                                    ))
                                    .await?;
                                // Keep working briefly so the post-input
                                // status is observable.
                                tokio::time::sleep(Duration::from_millis(100)).await;
                                Ok(json!({"content": [], "structuredContent": sampled}))
                            }
                            Behavior::Fail => Err(Error::internal("tool exploded")),
                        }
                    })
                }),
            )
            .await
    }
}

struct SlowSampling;

#[async_trait]
impl RequestHandler for SlowSampling {
    async fn handle(&self, _ctx: RequestContext, _params: Option<Value>) -> Result<Value> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(json!({
            "role": "assistant",
            "content": {"type": "text", "text": "sampled"},
            "model": "test-model"
        }))
    }
}

async fn setup(behavior: Behavior) -> (Session, Arc<TaskCoordinator>, Arc<InMemoryTaskStore>) {
    let (client, server) = session_pair();
    let store = InMemoryTaskStore::new(TaskStoreConfig {
        reaper_interval: Duration::from_millis(50),
        ..Default::default()
    });
    let coordinator = TaskCoordinator::new(store.clone(), false);
    coordinator.attach(&server);
    server.on_request(
        methods::TOOLS_CALL,
        Arc::new(TaskAwareTool {
            coordinator: coordinator.clone(),
            behavior,
        }),
    );
    client.on_request(methods::SAMPLING_CREATE_MESSAGE, Arc::new(SlowSampling));
    client.initialize().await.unwrap();
    (client, coordinator, store)
}

async fn call_task_tool(client: &Session, ttl: u64) -> Value {
    client
        .send_request(
            methods::TOOLS_CALL,
            Some(json!({"name": "tool", "arguments": {}, "task": {"ttl": ttl}})),
            RequestOptions::default(),
        )
        .await
        .unwrap()
}

async fn get_status(client: &Session, task_id: &str) -> TaskStatus {
    let task = client
        .send_request(
            methods::TASKS_GET,
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    serde_json::from_value(task["status"].clone()).unwrap()
}

async fn wait_for_status(client: &Session, task_id: &str, wanted: TaskStatus) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if get_status(client, task_id).await == wanted {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task never reached {wanted}"));
}

#[tokio::test]
async fn task_happy_path() {
    let (client, _coordinator, _store) = setup(Behavior::Complete).await;

    let stub = call_task_tool(&client, 5_000).await;
    assert_eq!(stub["task"]["status"], "working");
    let task_id = stub["task"]["taskId"].as_str().unwrap().to_string();
    assert!(!task_id.is_empty());

    wait_for_status(&client, &task_id, TaskStatus::Completed).await;

    let result = client
        .send_request(
            methods::TASKS_RESULT,
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "task done");
}

#[tokio::test]
async fn tasks_result_blocks_until_completion() {
    let (client, _coordinator, _store) = setup(Behavior::Complete).await;
    let stub = call_task_tool(&client, 5_000).await;
    let task_id = stub["task"]["taskId"].as_str().unwrap().to_string();

    // Fetch the result immediately, while the execution is still running.
    let result = client
        .send_request(
            methods::TASKS_RESULT,
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "task done");
}

#[tokio::test]
async fn input_required_suspension_round_trip() {
    let (client, _coordinator, _store) = setup(Behavior::NeedsInput).await;
    let stub = call_task_tool(&client, 10_000).await;
    let task_id = stub["task"]["taskId"].as_str().unwrap().to_string();

    // While the nested sampling request is outstanding the task reads
    // input_required, then returns to working, then completes.
    wait_for_status(&client, &task_id, TaskStatus::InputRequired).await;
    wait_for_status(&client, &task_id, TaskStatus::Working).await;
    wait_for_status(&client, &task_id, TaskStatus::Completed).await;

    let result = client
        .send_request(
            methods::TASKS_RESULT,
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result["structuredContent"]["model"], "test-model");
}

#[tokio::test]
async fn cancel_trips_the_execution_and_is_idempotent() {
    let (client, _coordinator, _store) = setup(Behavior::Hang).await;
    let stub = call_task_tool(&client, 60_000).await;
    let task_id = stub["task"]["taskId"].as_str().unwrap().to_string();

    let cancelled = client
        .send_request(
            methods::TASKS_CANCEL,
            Some(json!({"taskId": task_id, "reason": "operator request"})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["statusMessage"], "operator request");

    // A second cancel returns the terminal task unchanged.
    let again = client
        .send_request(
            methods::TASKS_CANCEL,
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(again["status"], "cancelled");
}

#[tokio::test]
async fn failed_execution_records_the_message() {
    let (client, _coordinator, _store) = setup(Behavior::Fail).await;
    let stub = call_task_tool(&client, 5_000).await;
    let task_id = stub["task"]["taskId"].as_str().unwrap().to_string();

    wait_for_status(&client, &task_id, TaskStatus::Failed).await;

    let err = client
        .send_request(
            methods::TASKS_RESULT,
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
    assert!(err.message.contains("tool exploded"));
}

#[tokio::test]
async fn ttl_expiry_cancels_the_execution_and_hides_the_task() {
    let (client, _coordinator, store) = setup(Behavior::Hang).await;
    let store_config_max = 60_000;
    let stub = call_task_tool(&client, store_config_max.min(80)).await;
    let task_id = stub["task"]["taskId"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(150)).await;
    store.reap_expired();

    let err = client
        .send_request(
            methods::TASKS_GET,
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParams);
}

#[tokio::test]
async fn tasks_list_pages_through_the_session_scope() {
    let (client, _coordinator, _store) = setup(Behavior::Complete).await;
    for _ in 0..5 {
        call_task_tool(&client, 60_000).await;
    }

    let mut seen = 0usize;
    let mut cursor: Option<String> = None;
    loop {
        let mut params = json!({});
        if let Some(cursor) = &cursor {
            params["cursor"] = json!(cursor);
        }
        let page = client
            .send_request(methods::TASKS_LIST, Some(params), RequestOptions::default())
            .await
            .unwrap();
        seen += page["tasks"].as_array().unwrap().len();
        match page["nextCursor"].as_str() {
            Some(next) => cursor = Some(next.to_string()),
            None => break,
        }
    }
    assert_eq!(seen, 5);
}

struct StatusCollector {
    statuses: Arc<Mutex<Vec<TaskStatus>>>,
}

#[async_trait]
impl NotificationHandler for StatusCollector {
    async fn handle(&self, _session: Session, params: Option<Value>) {
        if let Some(status) = params
            .as_ref()
            .and_then(|p| p.get("status"))
            .and_then(|s| serde_json::from_value(s.clone()).ok())
        {
            self.statuses.lock().push(status);
        }
    }
}

#[tokio::test]
async fn status_notifications_are_emitted_per_write() {
    let (client_side, server_side) = duplex_pair(TransportConfig::default());
    let server = Session::connect(
        PeerRole::Server,
        Arc::new(server_side),
        SessionOptions {
            server_capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                tasks: Some(TasksCapability {
                    list: Some(true),
                    cancel: Some(true),
                }),
                ..Default::default()
            },
            ..Default::default()
        },
    );
    // Status notifications need a session id for the registry lookup.
    server.set_session_id("session-notify");
    let client = Session::connect(
        PeerRole::Client,
        Arc::new(client_side),
        SessionOptions::default(),
    );

    let store = InMemoryTaskStore::new(TaskStoreConfig::default());
    let coordinator = TaskCoordinator::new(store, true);
    coordinator.attach(&server);
    server.on_request(
        methods::TOOLS_CALL,
        Arc::new(TaskAwareTool {
            coordinator,
            behavior: Behavior::Complete,
        }),
    );

    let statuses = Arc::new(Mutex::new(Vec::new()));
    client.on_notification(
        methods::NOTIFICATION_TASK_STATUS,
        Arc::new(StatusCollector {
            statuses: statuses.clone(),
        }),
    );
    client.initialize().await.unwrap();
    call_task_tool(&client, 5_000).await;

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if statuses.lock().contains(&TaskStatus::Completed) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no completion notification arrived");

    let seen = statuses.lock().clone();
    assert_eq!(seen.first(), Some(&TaskStatus::Working));
    assert_eq!(seen.last(), Some(&TaskStatus::Completed));
}
