//! Lifecycle gate and capability enforcement.
//!
//! A session passes through `Uninitialized → Initializing → Ready → Closed`.
//! Until `initialize` completes, only the handshake methods are accepted in
//! either direction. After negotiation, every feature-bound request consults
//! the peer's capability bag and fails locally - before anything is written -
//! when the capability was never advertised.

use plexmcp_protocol::types::{ClientCapabilities, ServerCapabilities};
use plexmcp_protocol::{Error, Result, methods};

/// Which side of the wire this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// The connecting side; issues `initialize`.
    Client,
    /// The accepting side; answers `initialize`.
    Server,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No initialize traffic yet
    Uninitialized,
    /// Initialize exchanged, waiting for `notifications/initialized`
    Initializing,
    /// Fully negotiated
    Ready,
    /// Closed; terminal
    Closed,
}

/// The peer's capability bag, fixed at negotiation.
#[derive(Debug, Clone)]
pub enum PeerCapabilities {
    /// We are the client; the peer is a server.
    Server(ServerCapabilities),
    /// We are the server; the peer is a client.
    Client(ClientCapabilities),
}

/// Check the lifecycle gate for a method in the given state.
pub fn check_phase(state: LifecycleState, method: &str) -> Result<()> {
    match state {
        LifecycleState::Ready => Ok(()),
        LifecycleState::Closed => Err(Error::lifecycle("session is closed")),
        LifecycleState::Uninitialized | LifecycleState::Initializing => {
            if methods::allowed_before_initialize(method) {
                Ok(())
            } else {
                Err(Error::lifecycle(format!(
                    "method {method} is not permitted before initialize completes"
                )))
            }
        }
    }
}

/// Refuse a feature-bound request the peer cannot serve.
///
/// Methods with no capability binding (ping, initialize, tasks/get,
/// tasks/result) always pass; the task surface proper is gated on the tasks
/// capability, and `tasks/list` / `tasks/cancel` on their nested flags.
pub fn check_capability(caps: &PeerCapabilities, method: &str) -> Result<()> {
    let refused = |what: &str| {
        Err(Error::capability(format!(
            "peer did not advertise the {what} capability required by {method}"
        )))
    };

    match caps {
        PeerCapabilities::Server(server) => match method {
            methods::TOOLS_LIST | methods::TOOLS_CALL if !server.supports_tools() => {
                refused("tools")
            }
            methods::PROMPTS_LIST | methods::PROMPTS_GET if !server.supports_prompts() => {
                refused("prompts")
            }
            methods::RESOURCES_LIST
            | methods::RESOURCES_TEMPLATES_LIST
            | methods::RESOURCES_READ
                if !server.supports_resources() =>
            {
                refused("resources")
            }
            methods::COMPLETION_COMPLETE if !server.supports_completions() => {
                refused("completions")
            }
            methods::LOGGING_SET_LEVEL if !server.supports_logging() => refused("logging"),
            methods::TASKS_GET | methods::TASKS_RESULT if !server.supports_tasks() => {
                refused("tasks")
            }
            methods::TASKS_LIST if !server.supports_task_list() => refused("tasks.list"),
            methods::TASKS_CANCEL if !server.supports_task_cancel() => refused("tasks.cancel"),
            _ => Ok(()),
        },
        PeerCapabilities::Client(client) => match method {
            methods::SAMPLING_CREATE_MESSAGE if !client.supports_sampling() => {
                refused("sampling")
            }
            methods::ELICITATION_CREATE if !client.supports_elicitation() => {
                refused("elicitation")
            }
            methods::ROOTS_LIST if !client.supports_roots() => refused("roots"),
            _ => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexmcp_protocol::ErrorKind;
    use plexmcp_protocol::types::capabilities::SamplingCapability;

    #[test]
    fn gate_blocks_feature_methods_until_ready() {
        assert!(check_phase(LifecycleState::Uninitialized, methods::INITIALIZE).is_ok());
        assert!(
            check_phase(
                LifecycleState::Initializing,
                methods::NOTIFICATION_CANCELLED
            )
            .is_ok()
        );
        let err = check_phase(LifecycleState::Uninitialized, methods::TOOLS_CALL).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lifecycle);
        assert!(check_phase(LifecycleState::Ready, methods::TOOLS_CALL).is_ok());
    }

    #[test]
    fn capability_refusal_happens_locally() {
        let caps = PeerCapabilities::Server(ServerCapabilities::default());
        let err = check_capability(&caps, methods::TOOLS_CALL).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapabilityNotSupported);
        // ping is never capability-bound
        assert!(check_capability(&caps, methods::PING).is_ok());
    }

    #[test]
    fn client_bag_gates_server_initiated_requests() {
        let none = PeerCapabilities::Client(ClientCapabilities::default());
        assert!(check_capability(&none, methods::SAMPLING_CREATE_MESSAGE).is_err());

        let with_sampling = PeerCapabilities::Client(ClientCapabilities {
            sampling: Some(SamplingCapability::default()),
            ..Default::default()
        });
        assert!(check_capability(&with_sampling, methods::SAMPLING_CREATE_MESSAGE).is_ok());
    }

    #[test]
    fn task_list_and_cancel_use_nested_flags() {
        use plexmcp_protocol::types::capabilities::TasksCapability;
        let caps = PeerCapabilities::Server(ServerCapabilities {
            tasks: Some(TasksCapability {
                list: Some(true),
                cancel: None,
            }),
            ..Default::default()
        });
        assert!(check_capability(&caps, methods::TASKS_GET).is_ok());
        assert!(check_capability(&caps, methods::TASKS_LIST).is_ok());
        assert!(check_capability(&caps, methods::TASKS_CANCEL).is_err());
    }
}
