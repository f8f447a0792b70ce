//! Session event relay.

use std::sync::Arc;

use pairlink_core::{ChatSession, MessageHandler, RelayError, SessionEvent, SessionNotification};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::ClientRegistry;

/// Forwards session notifications to every connected realtime client.
///
/// Notifications are processed one at a time in arrival order, so each
/// client sees events in the order the session produced them.
pub struct EventRelay {
    registry: Arc<ClientRegistry>,
    session: Arc<dyn ChatSession>,
    handler: Arc<dyn MessageHandler>,
}

impl EventRelay {
    /// A relay publishing to `registry`, handing inbound messages to `handler`.
    pub fn new(
        registry: Arc<ClientRegistry>,
        session: Arc<dyn ChatSession>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            registry,
            session,
            handler,
        }
    }

    /// Handle one notification: run the message handler for chat messages,
    /// then publish the normalized event. Returns the number of recipients.
    pub async fn on_session_notification(&self, notification: SessionNotification) -> usize {
        log_notification(&notification);

        if let SessionNotification::Message(message) = &notification {
            if let Err(e) = self.handler.handle(self.session.as_ref(), message).await {
                let e = match e {
                    RelayError::HandlerFailure(_) => e,
                    other => RelayError::HandlerFailure(other.to_string()),
                };
                tracing::error!(
                    from = %message.from,
                    error_kind = e.error_kind(),
                    error = %e,
                    "error in message handler"
                );
            }
        }

        self.publish(&SessionEvent::from(&notification))
    }

    /// Serialize and fan out one event.
    pub fn publish(&self, event: &SessionEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(event = event.event_name(), error = %e, "failed to serialize event");
                return 0;
            }
        };
        let recipients = self.registry.broadcast_all(&json);
        tracing::debug!(event = event.event_name(), recipients, "broadcast session event");
        recipients
    }

    /// Spawn the relay loop over a subscription taken from the session.
    pub fn start(
        self,
        mut rx: broadcast::Receiver<SessionNotification>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    recv = rx.recv() => match recv {
                        Ok(notification) => {
                            let _ = self.on_session_notification(notification).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "event relay lagged, dropped notifications");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("session notification channel closed");
                            break;
                        }
                    },
                    () = cancel.cancelled() => break,
                }
            }
        })
    }
}

fn log_notification(notification: &SessionNotification) {
    match notification {
        SessionNotification::Qr { .. } => tracing::info!("QR received, waiting for scan"),
        SessionNotification::Ready => tracing::info!("chat session ready"),
        SessionNotification::AuthFailure { message } => {
            tracing::error!(reason = %message, "chat session authentication failed");
        }
        SessionNotification::Disconnected { reason } => {
            tracing::warn!(reason = %reason, "chat session disconnected");
        }
        SessionNotification::Message(m) => tracing::debug!(from = %m.from, "chat message"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pairlink_core::testutil::{RecordingHandler, ScriptedSession};
    use pairlink_core::{InboundMessage, LogOnlyHandler, SessionNotifier};
    use tokio::sync::mpsc;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(90);

    fn message(body: &str) -> SessionNotification {
        SessionNotification::Message(InboundMessage {
            from: "15551234567@c.us".into(),
            body: Some(body.into()),
            timestamp: Some(1),
            ..Default::default()
        })
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    fn relay_with(handler: Arc<dyn MessageHandler>) -> (EventRelay, Arc<ClientRegistry>) {
        let registry = Arc::new(ClientRegistry::new(64, TIMEOUT));
        let session: Arc<dyn ChatSession> = Arc::new(ScriptedSession::new());
        (EventRelay::new(Arc::clone(&registry), session, handler), registry)
    }

    #[tokio::test]
    async fn k_notifications_reach_each_client_in_order() {
        let (relay, registry) = relay_with(Arc::new(LogOnlyHandler));
        let (_a, mut rx_a) = registry.register(String::new());
        let (_b, mut rx_b) = registry.register(String::new());

        let sequence = vec![
            SessionNotification::Qr { qr: "q1".into() },
            SessionNotification::Ready,
            message("hello"),
            SessionNotification::Disconnected { reason: "LOGOUT".into() },
            SessionNotification::Qr { qr: "q2".into() },
        ];
        let expected: Vec<&str> = vec![
            "whatsapp:qr",
            "whatsapp:ready",
            "whatsapp:message",
            "whatsapp:disconnected",
            "whatsapp:qr",
        ];
        for n in sequence {
            assert_eq!(relay.on_session_notification(n).await, 2);
        }

        for rx in [&mut rx_a, &mut rx_b] {
            let got = drain(rx);
            let names: Vec<&str> = got.iter().map(|v| v["event"].as_str().unwrap()).collect();
            assert_eq!(names, expected);
            assert_eq!(got[0]["data"]["qr"], "q1");
            assert_eq!(got[4]["data"]["qr"], "q2");
        }
    }

    #[tokio::test]
    async fn late_joiner_gets_no_replay() {
        let (relay, registry) = relay_with(Arc::new(LogOnlyHandler));
        let (_early, mut early_rx) = registry.register(String::new());

        let _ = relay.on_session_notification(SessionNotification::Qr { qr: "old".into() }).await;

        let (_late, mut late_rx) = registry.register(String::new());
        let _ = relay.on_session_notification(SessionNotification::Ready).await;

        assert_eq!(drain(&mut early_rx).len(), 2);
        let late = drain(&mut late_rx);
        assert_eq!(late.len(), 1);
        assert_eq!(late[0]["event"], "whatsapp:ready");
    }

    #[tokio::test]
    async fn handler_failure_still_publishes_and_next_message_flows() {
        let handler = Arc::new(RecordingHandler::failing_on("boom"));
        let (relay, registry) = relay_with(handler.clone());
        let (_c, mut rx) = registry.register(String::new());

        assert_eq!(relay.on_session_notification(message("boom")).await, 1);
        assert_eq!(relay.on_session_notification(message("after")).await, 1);

        let got = drain(&mut rx);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0]["event"], "whatsapp:message");
        assert_eq!(got[0]["data"]["body"], "boom");
        assert_eq!(got[1]["data"]["body"], "after");
        assert_eq!(handler.seen().len(), 2);
    }

    #[tokio::test]
    async fn handler_sees_message_before_it_is_published() {
        let handler = Arc::new(RecordingHandler::new());
        let (relay, registry) = relay_with(handler.clone());
        let (_c, mut rx) = registry.register(String::new());

        let _ = relay.on_session_notification(SessionNotification::Ready).await;
        assert!(handler.seen().is_empty());

        let _ = relay.on_session_notification(message("hi")).await;
        assert_eq!(handler.seen().len(), 1);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn no_clients_is_not_an_error() {
        let (relay, _registry) = relay_with(Arc::new(LogOnlyHandler));
        assert_eq!(relay.on_session_notification(SessionNotification::Ready).await, 0);
    }

    #[tokio::test]
    async fn started_relay_forwards_session_notifications() {
        let registry = Arc::new(ClientRegistry::new(64, TIMEOUT));
        let session = Arc::new(ScriptedSession::new());
        let relay = EventRelay::new(
            Arc::clone(&registry),
            session.clone(),
            Arc::new(LogOnlyHandler),
        );
        let (_c, mut rx) = registry.register(String::new());

        let cancel = CancellationToken::new();
        let handle = relay.start(session.subscribe(), cancel.clone());

        let _ = session.emit(SessionNotification::Qr { qr: "abc".into() });
        let _ = session.emit(SessionNotification::Ready);

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(first.contains("whatsapp:qr"));
        assert!(second.contains("whatsapp:ready"));

        cancel.cancel();
        handle.await.unwrap();
    }
}
