//! Wire types for every protocol method.
//!
//! Field names serialize in the camelCase the wire uses; Rust code reads
//! snake_case. Every request/result pair lives in the module named for its
//! feature area.

pub mod capabilities;
pub mod completion;
pub mod content;
pub mod core;
pub mod elicitation;
pub mod initialization;
pub mod logging;
pub mod progress;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tasks;
pub mod tools;

pub use capabilities::{ClientCapabilities, ServerCapabilities};
pub use completion::{CompleteRequest, CompleteResult};
pub use content::{Content, TextContent};
pub use self::core::{Cursor, EmptyResult, Implementation, ProgressToken, RequestId, Timestamp};
pub use elicitation::{ElicitRequest, ElicitResult};
pub use initialization::{InitializeRequest, InitializeResult};
pub use logging::{LoggingLevel, LoggingMessageNotification, SetLevelRequest};
pub use progress::{CancelledNotification, ProgressNotification};
pub use prompts::{GetPromptRequest, GetPromptResult, ListPromptsRequest, ListPromptsResult, Prompt};
pub use resources::{
    ListResourceTemplatesRequest, ListResourceTemplatesResult, ListResourcesRequest,
    ListResourcesResult, ReadResourceRequest, ReadResourceResult, Resource, ResourceTemplate,
};
pub use roots::{ListRootsResult, Root};
pub use sampling::{CreateMessageRequest, CreateMessageResult, SamplingMessage};
pub use tasks::{
    CancelTaskRequest, CreateTaskResult, GetTaskRequest, GetTaskResult, ListTasksRequest,
    ListTasksResult, Task, TaskMetadata, TaskStatus, TaskStatusNotification, TaskSupport,
};
pub use tools::{CallToolRequest, CallToolResult, ListToolsRequest, ListToolsResult, Tool};
