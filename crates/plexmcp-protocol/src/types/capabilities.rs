//! Capability bags exchanged during initialize.
//!
//! Each bag is a set of nested optional feature flags. The session refuses to
//! issue a feature-bound request when the peer's bag does not advertise the
//! corresponding capability, so every flag here has a `supports_*` accessor
//! used by the enforcement layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capabilities a client advertises to a server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientCapabilities {
    /// Sampling (server-initiated `sampling/createMessage`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,

    /// Elicitation (server-initiated `elicitation/create`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,

    /// Filesystem roots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,

    /// Experimental, non-standard capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

/// Capabilities a server advertises to a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerCapabilities {
    /// Tool catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,

    /// Prompt catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,

    /// Resource catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,

    /// `logging/setLevel` + `notifications/message`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,

    /// `completion/complete`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapability>,

    /// Task subsystem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TasksCapability>,

    /// Experimental, non-standard capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

/// Sampling capability with optional task augmentation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SamplingCapability {
    /// The client accepts task-augmented `sampling/createMessage`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<bool>,
}

/// Elicitation capability with optional task augmentation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElicitationCapability {
    /// The client accepts task-augmented `elicitation/create`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<bool>,
}

/// Roots capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RootsCapability {
    /// The client emits `notifications/roots/list_changed`.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Tools capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolsCapability {
    /// The server emits `notifications/tools/list_changed`.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Prompts capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptsCapability {
    /// The server emits `notifications/prompts/list_changed`.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resources capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourcesCapability {
    /// The server supports `resources/subscribe`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// The server emits `notifications/resources/list_changed`.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Logging capability (presence is the flag).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingCapability {}

/// Completions capability (presence is the flag).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionsCapability {}

/// Tasks capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TasksCapability {
    /// `tasks/list` is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<bool>,
    /// `tasks/cancel` is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel: Option<bool>,
}

impl ClientCapabilities {
    /// Client accepts `sampling/createMessage`.
    pub fn supports_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    /// Client accepts task-augmented sampling.
    pub fn supports_task_augmented_sampling(&self) -> bool {
        self.sampling
            .as_ref()
            .is_some_and(|s| s.tasks.unwrap_or(false))
    }

    /// Client accepts `elicitation/create`.
    pub fn supports_elicitation(&self) -> bool {
        self.elicitation.is_some()
    }

    /// Client accepts task-augmented elicitation.
    pub fn supports_task_augmented_elicitation(&self) -> bool {
        self.elicitation
            .as_ref()
            .is_some_and(|e| e.tasks.unwrap_or(false))
    }

    /// Client answers `roots/list`.
    pub fn supports_roots(&self) -> bool {
        self.roots.is_some()
    }
}

impl ServerCapabilities {
    /// Server exposes a tool catalog.
    pub fn supports_tools(&self) -> bool {
        self.tools.is_some()
    }

    /// Server exposes a prompt catalog.
    pub fn supports_prompts(&self) -> bool {
        self.prompts.is_some()
    }

    /// Server exposes a resource catalog.
    pub fn supports_resources(&self) -> bool {
        self.resources.is_some()
    }

    /// Server accepts `logging/setLevel`.
    pub fn supports_logging(&self) -> bool {
        self.logging.is_some()
    }

    /// Server answers `completion/complete`.
    pub fn supports_completions(&self) -> bool {
        self.completions.is_some()
    }

    /// Server runs the task subsystem.
    pub fn supports_tasks(&self) -> bool {
        self.tasks.is_some()
    }

    /// Server answers `tasks/list`.
    pub fn supports_task_list(&self) -> bool {
        self.tasks.as_ref().is_some_and(|t| t.list.unwrap_or(false))
    }

    /// Server answers `tasks/cancel`.
    pub fn supports_task_cancel(&self) -> bool {
        self.tasks
            .as_ref()
            .is_some_and(|t| t.cancel.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bags_advertise_nothing() {
        let client = ClientCapabilities::default();
        assert!(!client.supports_sampling());
        assert!(!client.supports_task_augmented_sampling());

        let server = ServerCapabilities::default();
        assert!(!server.supports_tools());
        assert!(!server.supports_task_cancel());
    }

    #[test]
    fn nested_flags_require_the_outer_capability() {
        let client = ClientCapabilities {
            sampling: Some(SamplingCapability { tasks: Some(true) }),
            ..Default::default()
        };
        assert!(client.supports_sampling());
        assert!(client.supports_task_augmented_sampling());

        let plain = ClientCapabilities {
            sampling: Some(SamplingCapability::default()),
            ..Default::default()
        };
        assert!(plain.supports_sampling());
        assert!(!plain.supports_task_augmented_sampling());
    }

    #[test]
    fn camel_case_on_the_wire() {
        let caps = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            ..Default::default()
        };
        let v = serde_json::to_value(&caps).unwrap();
        assert!(v["resources"]["listChanged"].as_bool().unwrap());
    }
}
