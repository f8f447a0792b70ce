//! Session notifications as reported by the chat session, and the normalized
//! events the relay publishes.

use serde::{Deserialize, Deserializer, Serialize};

/// A chat message as reported by the external session.
///
/// Every field is optional on the wire and a malformed value falls back to its
/// default, so a sloppy notification still reaches the handler and subscribers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Message id assigned by the chat network.
    #[serde(default)]
    pub id: Option<String>,
    /// Sender chat id.
    #[serde(default)]
    pub from: String,
    /// Text body, absent for media-only messages.
    #[serde(default)]
    pub body: Option<String>,
    /// Whether the message carries an attachment.
    #[serde(default)]
    pub has_media: Option<bool>,
    /// Unix seconds. Numeric strings are accepted, anything else becomes `None`.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Int(i64),
    Float(f64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Int(n) => Some(n),
        RawTimestamp::Float(f) if f.is_finite() => Some(f as i64),
        RawTimestamp::Text(s) => s.trim().parse().ok(),
        RawTimestamp::Float(_) | RawTimestamp::Other(_) => None,
    })
}

/// Raw lifecycle notification from the external chat session, tagged by kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotification {
    /// The session needs a QR scan to authenticate.
    Qr {
        /// Login payload to encode as a QR code.
        qr: String,
    },
    /// The session authenticated and is ready.
    Ready,
    /// Authentication was rejected.
    AuthFailure {
        /// Failure description from the session.
        #[serde(default)]
        message: String,
    },
    /// The session dropped.
    Disconnected {
        /// Why the session dropped.
        #[serde(default)]
        reason: String,
    },
    /// A chat message arrived.
    Message(InboundMessage),
}

impl SessionNotification {
    /// Event kind this notification normalizes to.
    pub fn kind(&self) -> SessionEventKind {
        match self {
            Self::Qr { .. } => SessionEventKind::AwaitingScan,
            Self::Ready => SessionEventKind::Ready,
            Self::AuthFailure { .. } => SessionEventKind::AuthFailed,
            Self::Disconnected { .. } => SessionEventKind::Disconnected,
            Self::Message(_) => SessionEventKind::InboundMessage,
        }
    }
}

/// The closed set of event kinds the relay publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    /// Waiting for the user to scan a login QR.
    AwaitingScan,
    /// Session linked and usable.
    Ready,
    /// Login was rejected.
    AuthFailed,
    /// Session dropped.
    Disconnected,
    /// A chat message arrived.
    InboundMessage,
}

impl SessionEventKind {
    /// Wire name of events of this kind.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::AwaitingScan => "whatsapp:qr",
            Self::Ready => "whatsapp:ready",
            Self::AuthFailed => "whatsapp:auth_failure",
            Self::Disconnected => "whatsapp:disconnected",
            Self::InboundMessage => "whatsapp:message",
        }
    }
}

/// Normalized, broadcastable session event.
///
/// Serializes as `{"event": "whatsapp:<kind>", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// A login QR to show the user.
    #[serde(rename = "whatsapp:qr")]
    AwaitingScan {
        /// QR payload.
        qr: String,
    },

    /// The session is linked. `ready` is always `true`.
    #[serde(rename = "whatsapp:ready")]
    Ready {
        /// Always `true`.
        ready: bool,
    },

    /// Login was rejected.
    #[serde(rename = "whatsapp:auth_failure")]
    AuthFailed {
        /// Failure description.
        msg: String,
    },

    /// The session dropped.
    #[serde(rename = "whatsapp:disconnected")]
    Disconnected {
        /// Why the session dropped.
        reason: String,
    },

    /// Selected fields of an inbound chat message.
    #[serde(rename = "whatsapp:message")]
    #[serde(rename_all = "camelCase")]
    InboundMessage {
        /// Sender chat id.
        from: String,
        /// Text body, empty for media-only messages.
        body: String,
        /// Whether the message carries an attachment.
        has_media: bool,
        /// Unix seconds, when the session reported one.
        timestamp: Option<i64>,
    },
}

impl SessionEvent {
    /// Kind of this event.
    pub fn kind(&self) -> SessionEventKind {
        match self {
            Self::AwaitingScan { .. } => SessionEventKind::AwaitingScan,
            Self::Ready { .. } => SessionEventKind::Ready,
            Self::AuthFailed { .. } => SessionEventKind::AuthFailed,
            Self::Disconnected { .. } => SessionEventKind::Disconnected,
            Self::InboundMessage { .. } => SessionEventKind::InboundMessage,
        }
    }

    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        self.kind().event_name()
    }
}

impl From<&SessionNotification> for SessionEvent {
    fn from(n: &SessionNotification) -> Self {
        match n {
            SessionNotification::Qr { qr } => Self::AwaitingScan { qr: qr.clone() },
            SessionNotification::Ready => Self::Ready { ready: true },
            SessionNotification::AuthFailure { message } => Self::AuthFailed {
                msg: message.clone(),
            },
            SessionNotification::Disconnected { reason } => Self::Disconnected {
                reason: reason.clone(),
            },
            SessionNotification::Message(m) => Self::InboundMessage {
                from: m.from.clone(),
                body: m.body.clone().unwrap_or_default(),
                has_media: m.has_media.unwrap_or(false),
                timestamp: m.timestamp,
            },
        }
    }
}
