//! Terminal rendering of session login QR codes.

use std::sync::Arc;

use pairlink_core::{ChatSession, SessionNotification, SessionNotifier};
use qrcode::render::unicode::Dense1x2;
use qrcode::QrCode;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Render `code` as half-block unicode art, light modules on dark so it scans
/// from a dark terminal. `None` if the payload doesn't fit in a QR code.
pub fn render_terminal(code: &str) -> Option<String> {
    let qr = QrCode::new(code.as_bytes()).ok()?;
    Some(
        qr.render::<Dense1x2>()
            .dark_color(Dense1x2::Light)
            .light_color(Dense1x2::Dark)
            .quiet_zone(true)
            .build(),
    )
}

/// Print every login QR the session announces until cancelled.
pub fn spawn_terminal_qr(
    session: &Arc<dyn ChatSession>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        loop {
            let notification = tokio::select! {
                () = cancel.cancelled() => break,
                received = rx.recv() => received,
            };
            match notification {
                Ok(SessionNotification::Qr { qr }) => match render_terminal(&qr) {
                    Some(art) => {
                        tracing::info!("scan the QR code below to link the session");
                        println!("{art}");
                    }
                    None => tracing::warn!(len = qr.len(), "QR payload could not be rendered"),
                },
                Ok(SessionNotification::Ready) => {
                    tracing::info!("session linked");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "terminal QR lagged behind session");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
