//! Task wire types.
//!
//! A request becomes *task-augmented* when its params carry a
//! [`TaskMetadata`] envelope. The receiver answers with a
//! [`CreateTaskResult`] stub immediately and the real result is fetched
//! later through `tasks/result`.
//!
//! Lifecycle:
//!
//! ```text
//! working ──→ input_required ──→ working ──→ terminal
//!    └──────────────┴──────────────────────────┘
//!
//! Terminal states: completed, failed, cancelled (no transitions out)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::core::{Cursor, Timestamp};

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The request is being processed
    Working,
    /// The task is waiting on requestor input (nested sampling/elicitation)
    InputRequired,
    /// Terminal: completed successfully
    Completed,
    /// Terminal: did not complete successfully
    Failed,
    /// Terminal: cancelled before completion
    Cancelled,
}

impl TaskStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// True when this status may transition to `next`.
    ///
    /// Both non-terminal states may move to any other state (a same-state
    /// write is a status-message refresh, not a transition). Terminal states
    /// admit nothing.
    pub fn can_transition_to(&self, _next: TaskStatus) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Working => "working",
            Self::InputRequired => "input_required",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Whether a primitive may execute as a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSupport {
    /// Task augmentation is rejected
    #[default]
    Forbidden,
    /// The caller chooses
    Optional,
    /// Every call runs as a task
    Required,
}

/// A task, as seen on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Globally unique task identifier
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Current status
    pub status: TaskStatus,
    /// Human-readable status detail; failure diagnostics on `failed`,
    /// cancellation reason on `cancelled`
    #[serde(rename = "statusMessage", skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Creation time; immutable, TTL is measured from here
    #[serde(rename = "createdAt")]
    pub created_at: Timestamp,
    /// Advances on every mutation
    #[serde(rename = "lastUpdatedAt")]
    pub last_updated_at: Timestamp,
    /// Live-span in milliseconds after which the task may be reaped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Suggested polling interval in milliseconds
    #[serde(rename = "pollInterval", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
}

/// Task envelope a caller attaches to make a request task-augmented.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskMetadata {
    /// Requested time-to-live in milliseconds (receiver may clamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// Stub returned in place of the real result on admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskResult {
    /// The created task
    pub task: Task,
}

/// `tasks/get` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskRequest {
    /// Task identifier
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// `tasks/get` result: the task itself.
pub type GetTaskResult = Task;

/// `tasks/result` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskResultRequest {
    /// Task identifier
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// `tasks/list` request parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTasksRequest {
    /// Pagination cursor from a previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// `tasks/list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResult {
    /// Tasks on this page
    pub tasks: Vec<Task>,
    /// Cursor for the next page
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// `tasks/cancel` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTaskRequest {
    /// Task identifier
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Optional reason recorded as the status message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `notifications/tasks/status` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusNotification {
    /// Task identifier
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Status at the time of the write
    pub status: TaskStatus,
    /// Status detail
    #[serde(rename = "statusMessage", skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Creation time
    #[serde(rename = "createdAt")]
    pub created_at: Timestamp,
    /// Last mutation time
    #[serde(rename = "lastUpdatedAt")]
    pub last_updated_at: Timestamp,
    /// Effective TTL in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Suggested polling interval in milliseconds
    #[serde(rename = "pollInterval", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
}

impl TaskStatusNotification {
    /// Build a status notification from a task snapshot.
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            status: task.status,
            status_message: task.status_message.clone(),
            created_at: task.created_at,
            last_updated_at: task.last_updated_at,
            ttl: task.ttl,
            poll_interval: task.poll_interval,
        }
    }
}

/// Extract the `task` envelope from raw request params, if any.
pub fn task_metadata_from_params(params: Option<&Value>) -> Option<TaskMetadata> {
    let task = params?.get("task")?;
    serde_json::from_value(task.clone()).ok()
}
