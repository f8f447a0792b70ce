//! # pairlink-server
//!
//! HTTP and realtime WebSocket surface of the pairing relay.
//!
//! - **HTTP**: `POST /api/pair`, `POST /api/send-song`, `GET /healthz`, and the
//!   static site for every other path
//! - **Realtime**: `/ws` clients request pairing links with `generatePair` and
//!   receive every `whatsapp:*` session event
//! - **Relay**: `EventRelay` runs the message handler, then fans each
//!   normalized event out to all connected clients

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod origin;
pub mod protocol;
pub mod relay;
pub mod server;

pub use config::ServerConfig;
pub use relay::EventRelay;
pub use server::{build_router, start, start_with_issuer, AppState, ServerHandle};
