//! Realtime client registry and per-connection WebSocket pumps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    /// A fresh time-ordered id.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected realtime client.
pub struct ClientConnection {
    /// Registry key of this client.
    pub id: ClientId,
    /// Origin the client connected from, used to build pairing URLs.
    pub origin: String,
    tx: mpsc::Sender<Arc<str>>,
    last_seen: AtomicU64,
    dropped: AtomicU64,
}

impl ClientConnection {
    fn new(id: ClientId, origin: String, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            origin,
            tx,
            last_seen: AtomicU64::new(now_secs()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a frame without waiting. Returns `false` if the queue is full or
    /// the connection is gone.
    pub fn send(&self, message: Arc<str>) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    client_id = %self.id,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Mark the client as seen now.
    pub fn record_activity(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }

    /// Whether the client was seen within `timeout`.
    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_seen.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }

    /// Frames dropped because the outbound queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected realtime clients.
///
/// Only connect and disconnect mutate the set; publishing works on a snapshot.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<ClientConnection>>,
    max_send_queue: usize,
    client_timeout: Duration,
}

impl ClientRegistry {
    /// An empty registry; each client gets a queue of `max_send_queue` frames.
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
            client_timeout,
        }
    }

    /// Register a new client and return its ID and outbound queue.
    pub fn register(&self, origin: String) -> (ClientId, mpsc::Receiver<Arc<str>>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let conn = Arc::new(ClientConnection::new(id.clone(), origin, tx));
        let _ = self.clients.insert(id.clone(), conn);
        (id, rx)
    }

    /// Remove a client. Reports frames it lost to a full queue.
    pub fn unregister(&self, id: &ClientId) {
        if let Some((_, conn)) = self.clients.remove(id) {
            let dropped = conn.drop_count();
            if dropped > 0 {
                tracing::warn!(client_id = %id, dropped, "client left with dropped frames");
            }
        }
    }

    /// Look up a connected client.
    pub fn get(&self, id: &ClientId) -> Option<Arc<ClientConnection>> {
        self.clients.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Send a frame to one client.
    pub fn send_to(&self, id: &ClientId, message: impl Into<Arc<str>>) -> bool {
        self.get(id).is_some_and(|c| c.send(message.into()))
    }

    /// Send a frame to every connected client. Returns how many accepted it.
    ///
    /// A full or closed queue only affects that client.
    pub fn broadcast_all(&self, message: &str) -> usize {
        let snapshot: Vec<Arc<ClientConnection>> =
            self.clients.iter().map(|e| Arc::clone(e.value())).collect();
        let message: Arc<str> = Arc::from(message);
        snapshot
            .iter()
            .filter(|c| c.send(Arc::clone(&message)))
            .count()
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Remove clients that have been silent past the timeout.
    pub fn cleanup_dead_clients(&self) -> usize {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|e| !e.value().is_alive(self.client_timeout))
            .map(|e| e.key().clone())
            .collect();

        for id in &dead {
            self.unregister(id);
            tracing::info!(client_id = %id, "cleaned up dead client");
        }
        dead.len()
    }
}

/// Drive one WebSocket: a writer forwarding the outbound queue plus pings,
/// and a reader forwarding text frames to `on_message`.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<Arc<str>>,
    registry: Arc<ClientRegistry>,
    on_message: mpsc::Sender<(ClientId, String)>,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_cid = client_id.clone();
    let writer_cancel = cancel.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(WsMessage::Text(text.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_cid, "sent ping");
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    let reader_cid = client_id.clone();
    let reader_registry = Arc::clone(&registry);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Some(conn) = reader_registry.get(&reader_cid) {
                conn.record_activity();
            }
            match msg {
                WsMessage::Text(text) => {
                    if on_message
                        .send((reader_cid.clone(), text.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    registry.unregister(&client_id);
    tracing::info!(client_id = %client_id, "realtime client disconnected");
}

/// Periodically drop clients that stopped answering pings.
pub fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = registry.cleanup_dead_clients();
                    if removed > 0 {
                        tracing::info!(removed, "dead client cleanup");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(90);

    #[test]
    fn client_id_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("client_"));
    }

    #[test]
    fn registry_register_and_unregister() {
        let registry = ClientRegistry::new(32, TIMEOUT);
        assert_eq!(registry.count(), 0);

        let (id1, _rx1) = registry.register("http://a".into());
        let (id2, _rx2) = registry.register("http://b".into());
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get(&id2).unwrap().origin, "http://b");

        registry.unregister(&id1);
        assert_eq!(registry.count(), 1);
        registry.unregister(&id2);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn broadcast_reaches_every_client() {
        let registry = ClientRegistry::new(32, TIMEOUT);
        let (_a, mut rx1) = registry.register(String::new());
        let (_b, mut rx2) = registry.register(String::new());

        assert_eq!(registry.broadcast_all("hello"), 2);
        assert_eq!(&*rx1.try_recv().unwrap(), "hello");
        assert_eq!(&*rx2.try_recv().unwrap(), "hello");
    }

    #[test]
    fn full_queue_only_affects_that_client() {
        let registry = ClientRegistry::new(1, TIMEOUT);
        let (slow, _slow_rx) = registry.register(String::new());
        let (_fast, mut fast_rx) = registry.register(String::new());

        assert_eq!(registry.broadcast_all("one"), 2);
        assert_eq!(&*fast_rx.try_recv().unwrap(), "one");

        // The slow client never drained its single slot.
        assert_eq!(registry.broadcast_all("two"), 1);
        assert_eq!(&*fast_rx.try_recv().unwrap(), "two");
        assert_eq!(registry.get(&slow).unwrap().drop_count(), 1);
    }

    #[test]
    fn unregister_after_drops_removes_client() {
        let registry = ClientRegistry::new(1, TIMEOUT);
        let (slow, _slow_rx) = registry.register(String::new());
        assert_eq!(registry.broadcast_all("one"), 1);
        assert_eq!(registry.broadcast_all("two"), 0);

        registry.unregister(&slow);
        assert_eq!(registry.count(), 0);
        assert!(registry.get(&slow).is_none());
    }

    #[test]
    fn closed_receiver_does_not_abort_broadcast() {
        let registry = ClientRegistry::new(8, TIMEOUT);
        let (_gone, gone_rx) = registry.register(String::new());
        let (_live, mut live_rx) = registry.register(String::new());
        drop(gone_rx);

        assert_eq!(registry.broadcast_all("x"), 1);
        assert_eq!(&*live_rx.try_recv().unwrap(), "x");
    }

    #[tokio::test]
    async fn send_to_specific_client() {
        let registry = ClientRegistry::new(32, TIMEOUT);
        let (id, mut rx) = registry.register(String::new());
        let (_other, mut other_rx) = registry.register(String::new());

        assert!(registry.send_to(&id, "direct"));
        assert_eq!(&*rx.recv().await.unwrap(), "direct");
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn send_to_nonexistent_client() {
        let registry = ClientRegistry::new(32, TIMEOUT);
        assert!(!registry.send_to(&ClientId::new(), "test"));
    }

    #[test]
    fn cleanup_dead_clients_removes_expired() {
        let registry = ClientRegistry::new(32, TIMEOUT);
        let (id, _rx) = registry.register(String::new());
        let (_live, _live_rx) = registry.register(String::new());

        registry
            .get(&id)
            .unwrap()
            .last_seen
            .store(0, Ordering::Relaxed);

        assert_eq!(registry.cleanup_dead_clients(), 1);
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&id).is_none());
    }
}
