//! # plexmcp-stdio
//!
//! The pipe-pair transport: newline-delimited JSON frames over any pair of
//! async byte streams. Covers process stdin/stdout, child-process pipes, and
//! in-memory duplex pairs for loopback tests.

pub mod transport;

pub use transport::{PipeTransport, duplex_pair};
