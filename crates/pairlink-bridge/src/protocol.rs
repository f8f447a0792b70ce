//! JSON frames exchanged with the session bridge.
//!
//! Bridge -> us: session notifications tagged by `type`, plus `ack` frames
//! answering a command. Us -> bridge: `hello` on connect, `send_media`.

use pairlink_core::SessionNotification;
use serde::{Deserialize, Serialize};

/// Commands sent to the bridge.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// First frame on every connection.
    #[serde(rename_all = "camelCase")]
    Hello {
        /// Session profile the bridge stores credentials under.
        client_id: String,
    },

    /// Send an attachment; answered by an [`Ack`] with the same id.
    #[serde(rename_all = "camelCase")]
    SendMedia {
        /// Correlates the acknowledgement.
        request_id: String,
        /// Destination chat id.
        to: String,
        /// MIME type of `data`.
        mimetype: String,
        /// File name shown to the recipient.
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        /// Standard base64.
        data: String,
        /// Deliver audio as a voice note.
        send_audio_as_voice: bool,
    },
}

/// Acknowledgement of a command.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    /// Id of the command being answered.
    pub request_id: String,
    /// Whether the bridge carried out the command.
    pub ok: bool,
    /// Failure reason when `ok` is false.
    #[serde(default)]
    pub error: Option<String>,
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeFrame {
    /// Answer to a command.
    Ack(Ack),
    /// Session lifecycle notification.
    Notification(SessionNotification),
}

/// Why an inbound frame was dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Not JSON, or not a known frame shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// JSON without a `type` tag.
    #[error("frame has no type")]
    MissingType,
}

/// Decode one text frame from the bridge.
pub fn decode_frame(text: &str) -> Result<BridgeFrame, FrameError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match value.get("type").and_then(|t| t.as_str()) {
        None => Err(FrameError::MissingType),
        Some("ack") => Ok(BridgeFrame::Ack(serde_json::from_value(value)?)),
        Some(_) => Ok(BridgeFrame::Notification(serde_json::from_value(value)?)),
    }
}
