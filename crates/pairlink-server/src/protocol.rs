//! Realtime wire format: every frame is `{"event": <name>, "data": <object>}`.

use pairlink_core::PairingToken;
use serde::{Deserialize, Serialize};

/// Frames a client may send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Request a fresh pairing link.
    GeneratePair,
    /// Any other event name; ignored.
    Unknown(String),
}

/// Direct replies to a single client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Answer to `generatePair`.
    #[serde(rename = "pairGenerated")]
    PairGenerated(PairingToken),

    /// A request from this client failed.
    #[serde(rename = "error")]
    Error {
        /// Human-readable failure.
        message: String,
    },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
}

/// Parse a client frame. Extra `data` is ignored: no client event carries a
/// payload.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    Ok(match envelope.event.as_str() {
        "generatePair" => ClientMessage::GeneratePair,
        _ => ClientMessage::Unknown(envelope.event),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_generate_pair_with_or_without_data() {
        assert_eq!(
            parse_client_message(r#"{"event":"generatePair"}"#).unwrap(),
            ClientMessage::GeneratePair
        );
        assert_eq!(
            parse_client_message(r#"{"event":"generatePair","data":{}}"#).unwrap(),
            ClientMessage::GeneratePair
        );
    }

    #[test]
    fn unknown_event_is_reported_by_name() {
        assert_eq!(
            parse_client_message(r#"{"event":"dance"}"#).unwrap(),
            ClientMessage::Unknown("dance".into())
        );
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(parse_client_message("generatePair").is_err());
        assert!(parse_client_message(r#"{"data":1}"#).is_err());
    }

    #[test]
    fn pair_generated_wire_shape() {
        let event = ServerEvent::PairGenerated(PairingToken {
            token: "tok".into(),
            url: "http://h/#/s/tok".into(),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "pairGenerated", "data": {"token": "tok", "url": "http://h/#/s/tok"}})
        );
    }

    #[test]
    fn error_wire_shape() {
        let event = ServerEvent::Error {
            message: "nope".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "error", "data": {"message": "nope"}})
        );
    }
}
