//! # plexmcp-tasks
//!
//! The task subsystem: asynchronous, resumable, pollable units of work that
//! survive disconnects, honor TTLs, suspend on nested input, and carry
//! strict terminal-state invariants.
//!
//! [`TaskCoordinator`] turns task-augmented requests into background
//! executions and serves the `tasks/*` protocol surface; [`TaskStore`] is
//! the persistence seam, with [`InMemoryTaskStore`] as the bundled
//! implementation.

pub mod coordinator;
pub mod id;
pub mod store;

pub use coordinator::{TaskCoordinator, TaskExecution, TaskHandle};
pub use id::TaskIdGenerator;
pub use store::{InMemoryTaskStore, TaskStore, TaskStoreConfig};
