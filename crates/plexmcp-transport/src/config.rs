//! Transport configuration.

use std::time::Duration;

/// Configuration shared by concrete transports.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum accepted frame size in bytes.
    pub max_frame_size: usize,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Delay before attempting a reconnect on a resumable transport.
    pub reconnect_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            connect_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}
