//! In-process doubles for the session and message-handler seams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::RelayError;
use crate::events::{InboundMessage, SessionNotification};
use crate::media::{MediaAttachment, SendOptions};
use crate::session::{ChatSession, MessageHandler, SessionNotifier};
use crate::token::{issue_token_with, PairingToken, TokenIssuer};

/// A media send captured by [`ScriptedSession`].
#[derive(Clone, Debug)]
pub struct SentMedia {
    /// Destination chat.
    pub to: String,
    /// Attachment as handed to the session.
    pub media: MediaAttachment,
    /// Options the caller passed.
    pub options: SendOptions,
}

/// Chat session driven by the test: notifications are pushed with
/// [`ScriptedSession::emit`] and sends are recorded.
pub struct ScriptedSession {
    tx: broadcast::Sender<SessionNotification>,
    sent: Mutex<Vec<SentMedia>>,
    fail_sends: AtomicBool,
    initialized: AtomicBool,
    shut_down: AtomicBool,
}

impl ScriptedSession {
    /// An idle session with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Publish a notification to current subscribers. Returns how many saw it.
    pub fn emit(&self, notification: SessionNotification) -> usize {
        self.tx.send(notification).unwrap_or(0)
    }

    /// Make subsequent sends fail with a collaborator error.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Every media send recorded so far.
    pub fn sent(&self) -> Vec<SentMedia> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Whether `initialize` was called.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether `shutdown` was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionNotifier for ScriptedSession {
    fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn initialize(&self) -> Result<(), RelayError> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send_media(
        &self,
        to: &str,
        media: &MediaAttachment,
        options: SendOptions,
    ) -> Result<(), RelayError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RelayError::ExternalCollaboratorFailure(
                "session not connected".into(),
            ));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMedia {
                to: to.to_owned(),
                media: media.clone(),
                options,
            });
        }
        Ok(())
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Handler that records every message and fails on a chosen body.
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<InboundMessage>>,
    fail_on_body: Option<String>,
}

impl RecordingHandler {
    /// A handler that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail for any message whose body equals `body`.
    pub fn failing_on(body: impl Into<String>) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail_on_body: Some(body.into()),
        }
    }

    /// Every message handled so far, in order.
    pub fn seen(&self) -> Vec<InboundMessage> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(
        &self,
        _session: &dyn ChatSession,
        message: &InboundMessage,
    ) -> Result<(), RelayError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(message.clone());
        }
        match (&self.fail_on_body, &message.body) {
            (Some(trigger), Some(body)) if trigger == body => {
                Err(RelayError::HandlerFailure(format!("refused body {body:?}")))
            }
            _ => Ok(()),
        }
    }
}

/// Random source whose every read fails, as when the OS entropy source is gone.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableRng;

impl rand::RngCore for UnavailableRng {
    fn next_u32(&mut self) -> u32 {
        0
    }

    fn next_u64(&mut self) -> u64 {
        0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }

    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new(std::io::Error::other("entropy source unavailable")))
    }
}

impl rand::CryptoRng for UnavailableRng {}

/// Token issuer drawing from [`UnavailableRng`]; every issue fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingIssuer;

impl TokenIssuer for FailingIssuer {
    fn issue(&self, origin: &str) -> Result<PairingToken, RelayError> {
        issue_token_with(&mut UnavailableRng, origin)
    }
}
