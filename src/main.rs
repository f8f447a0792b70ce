//! # pairlink
//!
//! Pairing relay binary: issues pairing links over HTTP and the realtime
//! channel, and relays chat-session lifecycle events to browser subscribers.

#![deny(unsafe_code)]

mod qr;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pairlink_bridge::{BridgeConfig, BridgeSession};
use pairlink_core::{ChatSession, LogOnlyHandler};
use pairlink_server::ServerConfig;
use pairlink_telemetry::{init_telemetry, TelemetryConfig};
use tokio_util::sync::CancellationToken;

/// Pairing relay server.
#[derive(Parser, Debug)]
#[command(name = "pairlink", about = "Pairing link issuer and session event relay")]
struct Cli {
    /// Host to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Destination chat for `POST /api/send-song`. Unset disables the endpoint.
    #[arg(long, env = "OWNER_NUMBER")]
    owner_number: Option<String>,

    /// Static site root.
    #[arg(long, env = "PUBLIC_DIR", default_value = "public")]
    public_dir: PathBuf,

    /// Media file to send; defaults to `<PUBLIC_DIR>/assets/song.mp3`.
    #[arg(long, env = "MEDIA_PATH")]
    media_path: Option<PathBuf>,

    /// WebSocket URL of the chat-session bridge.
    #[arg(long, env = "BRIDGE_URL", default_value = "ws://127.0.0.1:3001/session")]
    bridge_url: String,

    /// Session profile the bridge stores credentials under.
    #[arg(long, env = "BRIDGE_CLIENT_ID", default_value = "default")]
    bridge_client_id: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let media_path = self
            .media_path
            .clone()
            .unwrap_or_else(|| self.public_dir.join("assets").join("song.mp3"));
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            public_dir: self.public_dir.clone(),
            media_path,
            owner_number: self.owner_number.clone(),
            ..ServerConfig::default()
        }
    }

    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            url: self.bridge_url.clone(),
            client_id: self.bridge_client_id.clone(),
            ..BridgeConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    init_telemetry(&TelemetryConfig {
        json: args.log_json,
        ..TelemetryConfig::default()
    })
    .context("Failed to initialize logging")?;

    let config = args.server_config();
    if config.owner().is_none() {
        tracing::warn!("OWNER_NUMBER not set; /api/send-song is disabled");
    }

    let session: Arc<dyn ChatSession> = Arc::new(BridgeSession::new(args.bridge_config()));

    // Subscribers attach before the session starts so the first QR isn't lost.
    let handle = pairlink_server::start(config, Arc::clone(&session), Arc::new(LogOnlyHandler))
        .await
        .context("Failed to bind server")?;
    let qr_cancel = CancellationToken::new();
    let qr_task = qr::spawn_terminal_qr(&session, qr_cancel.clone());

    session
        .initialize()
        .await
        .context("Failed to initialize chat session")?;

    tracing::info!(addr = %handle.addr, bridge = %args.bridge_url, "pairlink listening");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    handle.shutdown().await;
    qr_cancel.cancel();
    let _ = qr_task.await;
    session.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
