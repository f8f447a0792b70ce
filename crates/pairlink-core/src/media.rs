//! Media attachments loaded from disk for sending.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

use crate::errors::RelayError;

/// Media payload handed to the chat session for sending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaAttachment {
    /// MIME type derived from the file extension.
    pub mime_type: String,
    /// File name shown to the recipient.
    pub filename: Option<String>,
    /// Raw file contents.
    pub data: Bytes,
}

/// Per-send options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Deliver audio as a voice note instead of a file attachment.
    pub send_audio_as_voice: bool,
}

impl MediaAttachment {
    /// Read a file from disk, deriving the MIME type from its extension.
    pub async fn from_path(path: &Path) -> Result<Self, RelayError> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayError::ResourceNotFound(format!("{} not found", path.display()))
            } else {
                RelayError::ExternalCollaboratorFailure(format!(
                    "failed to read {}: {e}",
                    path.display()
                ))
            }
        })?;

        Ok(Self {
            mime_type: mime_for_path(path).to_string(),
            filename: path
                .file_name()
                .and_then(|n| n.to_str())
                .map(ToOwned::to_owned),
            data: Bytes::from(data),
        })
    }

    /// Standard base64 encoding of the payload.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }
}

/// MIME type for the handful of media types a chat network accepts.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "ogg" | "opus" => "audio/ogg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
