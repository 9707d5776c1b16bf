//! Wire-level method names.
//!
//! Centralized so routing tables, capability checks, and tests never spell a
//! method twice.

/// `initialize` request
pub const INITIALIZE: &str = "initialize";
/// `notifications/initialized` notification
pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
/// `notifications/cancelled` notification
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
/// `notifications/progress` notification
pub const NOTIFICATION_PROGRESS: &str = "notifications/progress";
/// `ping` request
pub const PING: &str = "ping";

/// `tools/list` request
pub const TOOLS_LIST: &str = "tools/list";
/// `tools/call` request
pub const TOOLS_CALL: &str = "tools/call";

/// `prompts/list` request
pub const PROMPTS_LIST: &str = "prompts/list";
/// `prompts/get` request
pub const PROMPTS_GET: &str = "prompts/get";

/// `resources/list` request
pub const RESOURCES_LIST: &str = "resources/list";
/// `resources/templates/list` request
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
/// `resources/read` request
pub const RESOURCES_READ: &str = "resources/read";

/// `completion/complete` request
pub const COMPLETION_COMPLETE: &str = "completion/complete";

/// `logging/setLevel` request
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
/// `notifications/message` notification
pub const NOTIFICATION_MESSAGE: &str = "notifications/message";

/// `sampling/createMessage` request (server → client)
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
/// `elicitation/create` request (server → client)
pub const ELICITATION_CREATE: &str = "elicitation/create";
/// `roots/list` request (server → client)
pub const ROOTS_LIST: &str = "roots/list";
/// `notifications/roots/list_changed` notification
pub const NOTIFICATION_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

/// `tasks/get` request
pub const TASKS_GET: &str = "tasks/get";
/// `tasks/result` request
pub const TASKS_RESULT: &str = "tasks/result";
/// `tasks/list` request
pub const TASKS_LIST: &str = "tasks/list";
/// `tasks/cancel` request
pub const TASKS_CANCEL: &str = "tasks/cancel";
/// `notifications/tasks/status` notification
pub const NOTIFICATION_TASK_STATUS: &str = "notifications/tasks/status";

/// Methods legal on an uninitialized session, in either direction.
pub const PRE_INITIALIZE_METHODS: &[&str] = &[
    INITIALIZE,
    NOTIFICATION_INITIALIZED,
    NOTIFICATION_CANCELLED,
];

/// True if the method is permitted before `initialize` completes.
pub fn allowed_before_initialize(method: &str) -> bool {
    PRE_INITIALIZE_METHODS.contains(&method)
}
