//! Seams to the external chat session and the inbound message handler.
//!
//! The concrete session is constructed by the binary and injected; nothing in
//! the relay or the server constructs one.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::RelayError;
use crate::events::{InboundMessage, SessionNotification};
use crate::media::{MediaAttachment, SendOptions};

/// Source of session lifecycle notifications.
pub trait SessionNotifier: Send + Sync {
    /// Subscribe to notifications from this point on. Earlier notifications
    /// are not replayed.
    fn subscribe(&self) -> broadcast::Receiver<SessionNotification>;
}

/// A chat-network session owned by an external collaborator.
#[async_trait]
pub trait ChatSession: SessionNotifier {
    /// Start the session. Notifications begin flowing after this returns.
    async fn initialize(&self) -> Result<(), RelayError>;

    /// Send a media attachment to a chat.
    async fn send_media(
        &self,
        to: &str,
        media: &MediaAttachment,
        options: SendOptions,
    ) -> Result<(), RelayError>;

    /// Tear the session down. Idempotent.
    async fn shutdown(&self);
}

/// Handles each inbound chat message before it is published.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        session: &dyn ChatSession,
        message: &InboundMessage,
    ) -> Result<(), RelayError>;
}

/// Handler that only records the message in the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOnlyHandler;

#[async_trait]
impl MessageHandler for LogOnlyHandler {
    async fn handle(
        &self,
        _session: &dyn ChatSession,
        message: &InboundMessage,
    ) -> Result<(), RelayError> {
        tracing::info!(
            from = %message.from,
            has_media = message.has_media.unwrap_or(false),
            body_len = message.body.as_deref().map_or(0, str::len),
            "inbound message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{RecordingHandler, ScriptedSession};

    #[tokio::test]
    async fn log_only_handler_accepts_everything() {
        let session = ScriptedSession::new();
        let msg = InboundMessage {
            from: "a@c.us".into(),
            ..Default::default()
        };
        assert!(LogOnlyHandler.handle(&session, &msg).await.is_ok());
    }

    #[tokio::test]
    async fn subscribers_miss_earlier_notifications() {
        let session = ScriptedSession::new();
        assert_eq!(session.emit(SessionNotification::Ready), 0);

        let mut rx = session.subscribe();
        session.emit(SessionNotification::Disconnected {
            reason: "NAVIGATION".into(),
        });
        let got = rx.recv().await.unwrap();
        assert!(matches!(got, SessionNotification::Disconnected { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn recording_handler_fails_only_on_trigger() {
        let session = ScriptedSession::new();
        let handler = RecordingHandler::failing_on("boom");
        let ok = InboundMessage {
            from: "a".into(),
            body: Some("fine".into()),
            ..Default::default()
        };
        let bad = InboundMessage {
            from: "a".into(),
            body: Some("boom".into()),
            ..Default::default()
        };
        assert!(handler.handle(&session, &ok).await.is_ok());
        assert!(matches!(
            handler.handle(&session, &bad).await,
            Err(RelayError::HandlerFailure(_))
        ));
        assert_eq!(handler.seen().len(), 2);
    }
}
