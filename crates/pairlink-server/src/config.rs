//! Server settings.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,
    /// Listen port; 0 picks a free one.
    pub port: u16,
    /// Per-client outbound queue; frames beyond this are dropped for that client.
    pub max_send_queue: usize,
    /// Interval between WebSocket pings.
    pub heartbeat_interval: Duration,
    /// Clients silent for longer than this are dropped.
    pub client_timeout: Duration,
    /// How often silent clients are swept.
    pub cleanup_interval: Duration,
    /// Static site root.
    pub public_dir: PathBuf,
    /// Media file sent by `POST /api/send-song`.
    pub media_path: PathBuf,
    /// Destination chat for triggered media sends. `None` disables the endpoint.
    pub owner_number: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let public_dir = PathBuf::from("public");
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            max_send_queue: 256,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
            cleanup_interval: Duration::from_secs(60),
            media_path: public_dir.join("assets").join("song.mp3"),
            public_dir,
            owner_number: None,
        }
    }
}

impl ServerConfig {
    /// Owner destination, treating an empty value as unset.
    pub fn owner(&self) -> Option<&str> {
        self.owner_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
