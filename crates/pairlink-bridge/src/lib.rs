//! # pairlink-bridge
//!
//! [`ChatSession`](pairlink_core::ChatSession) backed by an external session
//! bridge process reached over a WebSocket.
//!
//! - **Protocol**: `hello` and `send_media` commands out, session
//!   notifications and `ack` frames in
//! - **Session**: reconnects with capped backoff, correlates acks by request
//!   id, and reports a lost link as a `Disconnected` notification

#![deny(unsafe_code)]

pub mod config;
pub mod protocol;
pub mod session;

pub use config::BridgeConfig;
pub use session::BridgeSession;
