//! The core transport trait.

use std::future::Future;
use std::pin::Pin;

use crate::error::TransportResult;
use crate::message::TransportMessage;

/// Connection state of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    /// Not yet connected
    Disconnected,
    /// Connected and exchanging frames
    Connected,
    /// Closed by either side; terminal
    Closed,
    /// Failed with a terminal error
    Failed {
        /// What went wrong
        reason: String,
    },
}

/// A byte-frame duplex between two peers.
///
/// Object-safe by design: the session multiplexer holds transports as
/// `Arc<dyn Transport>`. `receive` returns `Ok(None)` when the peer has
/// closed the stream cleanly; errors are transport failures that shut the
/// session down.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Current connection state.
    fn state(&self) -> Pin<Box<dyn Future<Output = TransportState> + Send + '_>>;

    /// Establish the connection.
    fn connect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Close the connection. Idempotent.
    fn disconnect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Send one frame.
    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Receive the next frame, suspending until one arrives.
    ///
    /// `Ok(None)` signals clean end-of-stream.
    fn receive(
        &self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<TransportMessage>>> + Send + '_>>;

    /// Endpoint identifier, when the transport has one.
    fn endpoint(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _object_safe(_t: &dyn Transport) {}
}
