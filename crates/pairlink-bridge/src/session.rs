//! Reconnecting bridge client implementing `ChatSession`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use pairlink_core::{
    ChatSession, MediaAttachment, RelayError, SendOptions, SessionNotification, SessionNotifier,
};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::protocol::{decode_frame, Ack, BridgeCommand, BridgeFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type AckResult = Result<(), String>;

const COMMAND_QUEUE: usize = 64;

/// A serialized command waiting for the connection task.
struct QueuedSend {
    request_id: String,
    json: String,
}

/// State shared between the session handle and its connection task.
struct Shared {
    config: BridgeConfig,
    notifications: broadcast::Sender<SessionNotification>,
    pending: DashMap<String, oneshot::Sender<AckResult>>,
    connected: AtomicBool,
}

impl Shared {
    fn publish(&self, notification: SessionNotification) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.notifications.send(notification);
    }

    fn fail_pending(&self, reason: &str) {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(reason.to_owned()));
            }
        }
    }

    fn resolve(&self, ack: Ack) {
        match self.pending.remove(&ack.request_id) {
            Some((_, tx)) => {
                let result = if ack.ok {
                    Ok(())
                } else {
                    Err(ack.error.unwrap_or_else(|| "send rejected".into()))
                };
                let _ = tx.send(result);
            }
            None => {
                tracing::debug!(request_id = %ack.request_id, "ack for unknown request");
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match decode_frame(text) {
            Ok(BridgeFrame::Ack(ack)) => self.resolve(ack),
            Ok(BridgeFrame::Notification(n)) => {
                tracing::debug!(kind = ?n.kind(), "bridge notification");
                self.publish(n);
            }
            Err(e) => {
                tracing::warn!(error = %e, frame_len = text.len(), "dropping bridge frame");
            }
        }
    }

    /// Drive one established connection until it ends. Returns the reason.
    async fn pump(
        &self,
        ws: WsStream,
        commands: &mut mpsc::Receiver<QueuedSend>,
        cancel: &CancellationToken,
    ) -> String {
        let (mut sink, mut stream) = ws.split();

        let hello = BridgeCommand::Hello {
            client_id: self.config.client_id.clone(),
        };
        match serde_json::to_string(&hello) {
            Ok(json) => {
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    return format!("handshake failed: {e}");
                }
            }
            Err(e) => return format!("handshake failed: {e}"),
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return "shutdown".into();
                }
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else {
                        return "command channel closed".into();
                    };
                    // The caller already got an error for this send.
                    if !self.pending.contains_key(&cmd.request_id) {
                        tracing::debug!(request_id = %cmd.request_id, "skipping abandoned send");
                        continue;
                    }
                    if let Err(e) = sink.send(Message::Text(cmd.json.into())).await {
                        return format!("write failed: {e}");
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        return frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "bridge closed connection".into());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return format!("read failed: {e}"),
                    None => return "bridge closed connection".into(),
                },
            }
        }
    }
}

/// Connection loop: connect, pump, surface the loss, back off, repeat.
async fn run(
    shared: Arc<Shared>,
    mut commands: mpsc::Receiver<QueuedSend>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            break;
        }

        match connect_async(shared.config.url.as_str()).await {
            Ok((ws, _)) => {
                attempt = 0;
                shared.connected.store(true, Ordering::SeqCst);
                tracing::info!(url = %shared.config.url, "session bridge connected");

                let reason = shared.pump(ws, &mut commands, &cancel).await;

                shared.connected.store(false, Ordering::SeqCst);
                shared.fail_pending(&reason);
                if cancel.is_cancelled() {
                    break;
                }
                tracing::warn!(reason = %reason, "session bridge disconnected");
                shared.publish(SessionNotification::Disconnected { reason });
            }
            Err(e) => {
                tracing::warn!(
                    url = %shared.config.url,
                    attempt,
                    error = %e,
                    "session bridge connect failed"
                );
            }
        }

        let delay = shared.config.reconnect_delay(attempt);
        attempt = attempt.saturating_add(1);
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    tracing::info!("session bridge loop stopped");
}

/// Chat session reached through an external bridge process.
pub struct BridgeSession {
    shared: Arc<Shared>,
    commands_tx: mpsc::Sender<QueuedSend>,
    commands_rx: Mutex<Option<mpsc::Receiver<QueuedSend>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeSession {
    /// A session that connects once [`ChatSession::initialize`] is called.
    pub fn new(config: BridgeConfig) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        Self {
            shared: Arc::new(Shared {
                config,
                notifications,
                pending: DashMap::new(),
                connected: AtomicBool::new(false),
            }),
            commands_tx,
            commands_rx: Mutex::new(Some(commands_rx)),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Whether a bridge connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl SessionNotifier for BridgeSession {
    fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.shared.notifications.subscribe()
    }
}

#[async_trait]
impl ChatSession for BridgeSession {
    async fn initialize(&self) -> Result<(), RelayError> {
        let rx = self
            .commands_rx
            .lock()
            .map_err(|_| RelayError::ExternalCollaboratorFailure("session state poisoned".into()))?
            .take()
            .ok_or_else(|| {
                RelayError::ExternalCollaboratorFailure("session already initialized".into())
            })?;

        let handle = tokio::spawn(run(Arc::clone(&self.shared), rx, self.cancel.clone()));
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        Ok(())
    }

    async fn send_media(
        &self,
        to: &str,
        media: &MediaAttachment,
        options: SendOptions,
    ) -> Result<(), RelayError> {
        if !self.is_connected() {
            return Err(RelayError::ExternalCollaboratorFailure(
                "session bridge not connected".into(),
            ));
        }

        let request_id = Uuid::now_v7().to_string();
        let cmd = BridgeCommand::SendMedia {
            request_id: request_id.clone(),
            to: to.to_owned(),
            mimetype: media.mime_type.clone(),
            filename: media.filename.clone(),
            data: media.to_base64(),
            send_audio_as_voice: options.send_audio_as_voice,
        };
        let json = serde_json::to_string(&cmd)
            .map_err(|e| RelayError::ExternalCollaboratorFailure(e.to_string()))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        let _ = self.shared.pending.insert(request_id.clone(), ack_tx);

        let queued = QueuedSend {
            request_id: request_id.clone(),
            json,
        };
        if self.commands_tx.send(queued).await.is_err() {
            let _ = self.shared.pending.remove(&request_id);
            return Err(RelayError::ExternalCollaboratorFailure(
                "session bridge stopped".into(),
            ));
        }

        match tokio::time::timeout(self.shared.config.ack_timeout, ack_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(RelayError::ExternalCollaboratorFailure(reason)),
            Ok(Err(_)) => Err(RelayError::ExternalCollaboratorFailure(
                "session bridge dropped the request".into(),
            )),
            Err(_) => {
                let _ = self.shared.pending.remove(&request_id);
                Err(RelayError::ExternalCollaboratorFailure(format!(
                    "no acknowledgement within {:?}",
                    self.shared.config.ack_timeout
                )))
            }
        }
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.shared.fail_pending("shutdown");
    }
}
