//! # plexmcp-transport
//!
//! Lean transport abstractions: the [`Transport`] trait every concrete
//! transport implements, the [`TransportMessage`] frame wrapper, and the
//! transport error taxonomy. Concrete transports live in their own crates
//! (`plexmcp-stdio`, `plexmcp-http`, `plexmcp-streamable`).

pub mod config;
pub mod error;
pub mod message;
pub mod traits;

pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};
pub use message::{TransportMessage, TransportMessageMetadata};
pub use traits::{Transport, TransportState};
