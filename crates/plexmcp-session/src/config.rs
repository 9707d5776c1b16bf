//! Session configuration.

use std::time::Duration;

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline applied to `send_request` when the caller supplies none.
    pub default_request_timeout: Duration,
    /// Bounded timeout for the initialize handshake itself.
    pub initialize_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_request_timeout: Duration::from_secs(60),
            initialize_timeout: Duration::from_secs(30),
        }
    }
}
