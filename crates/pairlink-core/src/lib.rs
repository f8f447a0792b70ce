//! # pairlink-core
//!
//! Shared vocabulary for the pairing relay:
//!
//! - **Tokens**: `issue_token` draws 24 bytes from the OS CSPRNG and builds the
//!   shareable `/#/s/<token>` URL
//! - **Events**: raw `SessionNotification`s and the normalized `SessionEvent`
//!   wire form broadcast to realtime clients
//! - **Seams**: `ChatSession`, `SessionNotifier` and `MessageHandler` traits
//!   for the injected chat session
//! - **Errors**: `RelayError` taxonomy via `thiserror`
//! - **Test doubles**: `testutil`, behind the `testutil` feature

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod media;
pub mod session;
pub mod token;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use errors::RelayError;
pub use events::{InboundMessage, SessionEvent, SessionEventKind, SessionNotification};
pub use media::{MediaAttachment, SendOptions};
pub use session::{ChatSession, LogOnlyHandler, MessageHandler, SessionNotifier};
pub use token::{issue_token, OsTokenIssuer, PairingToken, TokenIssuer};
