//! HTTP endpoint handlers and realtime message dispatch.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use pairlink_core::{
    ChatSession, MediaAttachment, PairingToken, RelayError, SendOptions, TokenIssuer,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientId, ClientRegistry};
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::origin::request_origin;
use crate::protocol::{parse_client_message, ClientMessage, ServerEvent};
use crate::server::AppState;

/// `POST /api/pair`
pub async fn pair(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PairingToken>, ApiError> {
    let origin = request_origin(&headers);
    let issued = state.issuer.issue(&origin).inspect_err(|e| {
        tracing::error!(
            origin = %origin,
            error_kind = e.error_kind(),
            error = %e,
            "pairing token issuance failed"
        );
    })?;
    tracing::info!(origin = %origin, fingerprint = %issued.fingerprint(), "pairing token issued over http");
    Ok(Json(issued))
}

/// `POST /api/send-song`
pub async fn send_song(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    match send_owner_media(&state.config, state.session.as_ref()).await {
        Ok(()) => Ok(Json(serde_json::json!({ "ok": true }))),
        Err(e) => {
            if e.is_client_facing() {
                tracing::warn!(error = %e, "send-song rejected");
            } else {
                tracing::error!(error = %e, error_kind = e.error_kind(), "send-song error");
            }
            Err(e.into())
        }
    }
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

/// Send the configured media file to the owner's chat.
pub async fn send_owner_media(
    config: &ServerConfig,
    session: &dyn ChatSession,
) -> Result<(), RelayError> {
    let owner = config
        .owner()
        .ok_or(RelayError::ConfigurationMissing("OWNER_NUMBER"))?;

    let song_missing = || RelayError::ResourceNotFound("song not found on server".into());
    if !tokio::fs::try_exists(&config.media_path)
        .await
        .unwrap_or(false)
    {
        return Err(song_missing());
    }

    let media = MediaAttachment::from_path(&config.media_path)
        .await
        .map_err(|e| match e {
            RelayError::ResourceNotFound(_) => song_missing(),
            other => other,
        })?;

    session
        .send_media(owner, &media, SendOptions::default())
        .await?;
    tracing::info!(to = %owner, bytes = media.data.len(), "song sent");
    Ok(())
}

/// Handle one text frame from a realtime client.
pub fn handle_realtime_message(
    registry: &ClientRegistry,
    issuer: &dyn TokenIssuer,
    client_id: &ClientId,
    raw: &str,
) {
    let message = match parse_client_message(raw) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(client_id = %client_id, error = %e, "ignoring malformed client frame");
            return;
        }
    };

    match message {
        ClientMessage::GeneratePair => {
            let Some(origin) = registry.get(client_id).map(|c| c.origin.clone()) else {
                return;
            };
            let reply = match issuer.issue(&origin) {
                Ok(issued) => {
                    tracing::info!(
                        client_id = %client_id,
                        fingerprint = %issued.fingerprint(),
                        "pairing token issued over realtime channel"
                    );
                    ServerEvent::PairGenerated(issued)
                }
                Err(e) => {
                    tracing::error!(
                        client_id = %client_id,
                        error_kind = e.error_kind(),
                        error = %e,
                        "pairing token issuance failed"
                    );
                    ServerEvent::Error {
                        message: e.to_string(),
                    }
                }
            };
            if let Ok(json) = serde_json::to_string(&reply) {
                let _ = registry.send_to(client_id, json);
            }
        }
        ClientMessage::Unknown(event) => {
            tracing::debug!(client_id = %client_id, event = %event, "ignoring unknown client event");
        }
    }
}

/// Process realtime frames from all clients, one at a time.
pub async fn process_realtime_messages(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    registry: Arc<ClientRegistry>,
    issuer: Arc<dyn TokenIssuer>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some((client_id, raw)) = msg else { break };
                handle_realtime_message(&registry, issuer.as_ref(), &client_id, &raw);
            }
            () = cancel.cancelled() => break,
        }
    }
}
