//! # plexmcp-session
//!
//! One logical peer-to-peer duplex over one transport, carrying JSON-RPC
//! traffic in both directions concurrently. The multiplexer owns four
//! responsibilities:
//!
//! - **Correlation** - every outgoing request gets a fresh id and a pending
//!   entry; the matching response unblocks exactly that caller.
//! - **Cancellation** - caller cancellation and deadlines emit a single
//!   `notifications/cancelled`; incoming cancellations trip the handler's
//!   context.
//! - **Progress fan-out** - progress notifications route to the sink whose
//!   token they carry.
//! - **Lifecycle** - before `initialize` completes, only the handshake
//!   methods pass in either direction, and feature-bound requests are
//!   refused locally when the peer never advertised the capability.
//!
//! Dispatch runs on worker tasks: a slow request handler never blocks
//! response correlation, and a handler may issue further requests on the
//! same session before returning (server → client sampling, elicitation,
//! `roots/list`).

pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod logging;
pub mod progress;
pub mod session;

pub use config::SessionConfig;
pub use handlers::{NotificationHandler, RequestContext, RequestHandler};
pub use lifecycle::{LifecycleState, PeerRole};
pub use logging::McpLogger;
pub use progress::{ChannelProgressSink, ProgressSink};
pub use session::{RequestOptions, Session, SessionOptions};
