//! Connection settings for the session bridge.

use std::time::Duration;

/// Connection settings for the session bridge.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// WebSocket URL of the bridge, e.g. `ws://127.0.0.1:3001/session`.
    pub url: String,
    /// Session profile the bridge persists credentials under.
    pub client_id: String,
    /// How long to wait for the bridge to acknowledge a send.
    pub ack_timeout: Duration,
    /// First reconnect delay.
    pub base_delay: Duration,
    /// Reconnect delay cap.
    pub max_delay: Duration,
    /// Capacity of the notification broadcast channel.
    pub notification_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3001/session".into(),
            client_id: "default".into(),
            ack_timeout: Duration::from_secs(60),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            notification_capacity: 1024,
        }
    }
}

impl BridgeConfig {
    /// Exponential backoff: base * 2^attempt, capped at `max_delay`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}
