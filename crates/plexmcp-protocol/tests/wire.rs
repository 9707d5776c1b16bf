//! Wire-shape tests: the exact JSON every recognized method puts on the
//! wire.

use pretty_assertions::assert_eq;
use serde_json::json;

use plexmcp_protocol::jsonrpc::{JsonRpcMessage, JsonRpcRequest};
use plexmcp_protocol::types::capabilities::{SamplingCapability, TasksCapability};
use plexmcp_protocol::types::tasks::TaskMetadata;
use plexmcp_protocol::types::{
    CallToolRequest, CancelledNotification, ClientCapabilities, Implementation, InitializeRequest,
    ProgressNotification, ServerCapabilities, Task, TaskStatus, Timestamp,
};
use plexmcp_protocol::{RequestId, methods};

#[test]
fn initialize_request_shape() {
    let request = InitializeRequest {
        protocol_version: "2025-06-18".into(),
        capabilities: ClientCapabilities {
            sampling: Some(SamplingCapability { tasks: Some(true) }),
            ..Default::default()
        },
        client_info: Implementation {
            name: "inspector".into(),
            title: None,
            version: "1.2.3".into(),
        },
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
        value,
        json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {"sampling": {"tasks": true}},
            "clientInfo": {"name": "inspector", "version": "1.2.3"},
        })
    );
}

#[test]
fn server_capabilities_shape() {
    let capabilities = ServerCapabilities {
        tasks: Some(TasksCapability {
            list: Some(true),
            cancel: Some(true),
        }),
        ..Default::default()
    };
    assert_eq!(
        serde_json::to_value(&capabilities).unwrap(),
        json!({"tasks": {"list": true, "cancel": true}})
    );
}

#[test]
fn task_augmented_tool_call_shape() {
    let call = CallToolRequest {
        name: "long_analysis".into(),
        arguments: Some(json!({"dataset": "big"})),
        task: Some(TaskMetadata { ttl: Some(300_000) }),
    };
    let value = serde_json::to_value(&call).unwrap();
    assert_eq!(value["task"], json!({"ttl": 300_000}));

    // Round-trips with the envelope intact.
    let back: CallToolRequest = serde_json::from_value(value).unwrap();
    assert_eq!(back.task, Some(TaskMetadata { ttl: Some(300_000) }));
}

#[test]
fn task_wire_field_names_are_camel_case() {
    let now = Timestamp::now();
    let task = Task {
        task_id: "0198a-demo".into(),
        status: TaskStatus::InputRequired,
        status_message: Some("waiting on input".into()),
        created_at: now,
        last_updated_at: now,
        ttl: Some(60_000),
        poll_interval: Some(2_000),
    };
    let value = serde_json::to_value(&task).unwrap();
    assert_eq!(value["taskId"], "0198a-demo");
    assert_eq!(value["status"], "input_required");
    assert_eq!(value["statusMessage"], "waiting on input");
    assert!(value.get("createdAt").is_some());
    assert!(value.get("lastUpdatedAt").is_some());
    assert_eq!(value["pollInterval"], 2_000);
}

#[test]
fn progress_notification_round_trip() {
    let raw = json!({
        "progressToken": "p1",
        "progress": 2.0,
        "total": 3.0,
    });
    let parsed: ProgressNotification = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(parsed.progress_token, RequestId::String("p1".into()));
    assert_eq!(serde_json::to_value(&parsed).unwrap(), raw);
}

#[test]
fn cancelled_notification_carries_reason() {
    let cancelled = CancelledNotification {
        request_id: RequestId::Number(12),
        reason: Some("timeout".into()),
    };
    assert_eq!(
        serde_json::to_value(&cancelled).unwrap(),
        json!({"requestId": 12, "reason": "timeout"})
    );
}

#[test]
fn full_request_frame_round_trip() {
    let request = JsonRpcRequest::with_params(
        methods::TOOLS_CALL,
        CallToolRequest {
            name: "echo".into(),
            arguments: Some(json!({"s": "hi"})),
            task: None,
        },
        RequestId::Number(1),
    )
    .unwrap();
    let bytes = serde_json::to_vec(&JsonRpcMessage::Request(request)).unwrap();

    match JsonRpcMessage::parse(&bytes).unwrap() {
        JsonRpcMessage::Request(parsed) => {
            assert_eq!(parsed.method, methods::TOOLS_CALL);
            assert_eq!(parsed.params.unwrap()["name"], "echo");
        }
        other => panic!("expected request frame, got {other:?}"),
    }
}
