//! Router assembly, startup and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use pairlink_core::{ChatSession, MessageHandler, OsTokenIssuer, SessionNotifier, TokenIssuer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientId, ClientRegistry};
use crate::config::ServerConfig;
use crate::handlers;
use crate::origin::handshake_origin;
use crate::relay::EventRelay;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server settings.
    pub config: Arc<ServerConfig>,
    /// Injected chat session used for media sends.
    pub session: Arc<dyn ChatSession>,
    /// Pairing token source.
    pub issuer: Arc<dyn TokenIssuer>,
    /// Connected realtime clients.
    pub client_registry: Arc<ClientRegistry>,
    /// Inbound realtime frames, consumed by the dispatch task.
    pub message_tx: mpsc::Sender<(ClientId, String)>,
    /// Cancelled on shutdown.
    pub cancel: CancellationToken,
}

/// Build the Axum router with all routes. Unmatched paths fall through to
/// the static site.
pub fn build_router(state: AppState) -> Router {
    let static_site = ServeDir::new(&state.config.public_dir);
    Router::new()
        .route("/api/pair", post(handlers::pair))
        .route("/api/send-song", post(handlers::send_song))
        .route("/healthz", get(handlers::healthz))
        .route("/ws", get(ws_handler))
        .fallback_service(static_site)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listener, subscribe the relay to the session, and start serving.
///
/// The relay subscribes before this returns, so the caller should initialize
/// the session afterwards to avoid missing its first notifications.
pub async fn start(
    config: ServerConfig,
    session: Arc<dyn ChatSession>,
    handler: Arc<dyn MessageHandler>,
) -> Result<ServerHandle, std::io::Error> {
    start_with_issuer(config, session, handler, Arc::new(OsTokenIssuer)).await
}

/// [`start`] with an explicit pairing token source.
pub async fn start_with_issuer(
    config: ServerConfig,
    session: Arc<dyn ChatSession>,
    handler: Arc<dyn MessageHandler>,
    issuer: Arc<dyn TokenIssuer>,
) -> Result<ServerHandle, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    let cancel = CancellationToken::new();
    let client_registry = Arc::new(ClientRegistry::new(
        config.max_send_queue,
        config.client_timeout,
    ));

    let relay = EventRelay::new(Arc::clone(&client_registry), Arc::clone(&session), handler);
    let relay_handle = relay.start(session.subscribe(), cancel.clone());

    let cleanup_handle = client::start_cleanup_task(
        Arc::clone(&client_registry),
        config.cleanup_interval,
        cancel.clone(),
    );

    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);
    let realtime_handle = tokio::spawn(handlers::process_realtime_messages(
        msg_rx,
        Arc::clone(&client_registry),
        Arc::clone(&issuer),
        cancel.clone(),
    ));

    let app_state = AppState {
        config: Arc::new(config),
        session,
        issuer,
        client_registry: Arc::clone(&client_registry),
        message_tx: msg_tx,
        cancel: cancel.clone(),
    };
    let router = build_router(app_state);

    tracing::info!(addr = %local_addr, "server listening");

    let serve_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        client_registry,
        cancel,
        tasks: vec![server_handle, relay_handle, cleanup_handle, realtime_handle],
    })
}

/// Handle returned by `start()`: keeps background tasks alive and tears
/// them down on `shutdown()`.
pub struct ServerHandle {
    /// Bound listen address.
    pub addr: SocketAddr,
    client_registry: Arc<ClientRegistry>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Bound port, useful when configured with port 0.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of connected realtime clients.
    pub fn client_count(&self) -> usize {
        self.client_registry.count()
    }

    /// Stop accepting connections, close realtime clients and stop the relay.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let task_count = self.tasks.len();
        let aborts: Vec<_> = self.tasks.iter().map(JoinHandle::abort_handle).collect();
        let drain = futures::future::join_all(self.tasks);
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
            tracing::warn!(task_count, "shutdown timed out, aborting remaining tasks");
            for handle in aborts {
                handle.abort();
            }
        }
        tracing::info!("server stopped");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let origin = handshake_origin(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, origin, state))
}

async fn handle_socket(socket: WebSocket, origin: String, state: AppState) {
    let (client_id, rx) = state.client_registry.register(origin);
    tracing::info!(client_id = %client_id, "realtime client connected");

    client::handle_ws_connection(
        socket,
        client_id,
        rx,
        state.client_registry,
        state.message_tx,
        state.config.heartbeat_interval,
        state.cancel,
    )
    .await;
}
