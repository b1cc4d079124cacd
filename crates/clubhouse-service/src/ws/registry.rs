//! Live WebSocket connections, one per user.
//!
//! Registering a second connection for a user evicts the first
//! (last-connection-wins). Unregistering is conditional on identity, so a
//! connection that was already evicted cannot remove its replacement.
//!
//! The map lock is held only for the map operation itself. Closing an
//! evicted connection happens after the lock is released; it only queues a
//! close frame for that connection's writer task.

use crate::observability::metrics::{record_ws_eviction, set_ws_connections};
use axum::extract::ws::{CloseFrame, Message};
use common::types::UserId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

/// Close code sent to a connection replaced by a newer one.
pub const CLOSE_REPLACED: u16 = 4000;

/// Close code for a normal server-side close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent during shutdown.
pub const CLOSE_GOING_AWAY: u16 = 1001;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

struct ConnectionInner {
    id: u64,
    remote_addr: Option<SocketAddr>,
    sender: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
}

/// Handle to one live socket.
///
/// Cheap to clone; clones refer to the same connection. Frames go through
/// the connection's writer task, so sending never blocks.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionInner>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionHandle {
    pub fn new(remote_addr: Option<SocketAddr>, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                remote_addr,
                sender,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique connection id, for logs.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    /// Whether both handles refer to the same connection.
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Queue a frame. Returns false if the connection is closed or its
    /// writer has gone away.
    pub fn send(&self, message: Message) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner.sender.send(message).is_ok()
    }

    /// Queue a text frame.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Message::Text(text.into()))
    }

    /// Close the connection. Only the first call has any effect; it returns
    /// true, later calls return false.
    pub fn close(&self, code: u16, reason: &'static str) -> bool {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Writer may already be gone; the socket is finished either way.
        let _ = self.inner.sender.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })));
        true
    }
}

/// User id to live connection.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, ConnectionHandle>> {
        self.connections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, ConnectionHandle>> {
        self.connections.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `conn` the user's current connection, closing any previous one.
    ///
    /// The returned guard unregisters and closes `conn` when dropped.
    pub fn register(&self, user_id: UserId, conn: ConnectionHandle) -> RegistrationGuard {
        let evicted = {
            let mut map = self.write();
            let previous = map.insert(user_id, conn.clone());
            set_ws_connections(map.len());
            previous.filter(|prev| !prev.same_connection(&conn))
        };

        if let Some(old) = evicted {
            if old.close(CLOSE_REPLACED, "Replaced by a newer connection") {
                record_ws_eviction();
            }
            tracing::info!(
                target: "clubhouse.ws.registry",
                user_id = %user_id,
                evicted_connection = old.id(),
                connection = conn.id(),
                "Evicted previous connection"
            );
        } else {
            tracing::debug!(
                target: "clubhouse.ws.registry",
                user_id = %user_id,
                connection = conn.id(),
                "Connection registered"
            );
        }

        RegistrationGuard {
            registry: self.clone(),
            user_id,
            conn,
        }
    }

    /// Remove the user's entry if, and only if, it is `conn`.
    pub fn unregister(&self, user_id: UserId, conn: &ConnectionHandle) -> bool {
        let mut map = self.write();
        let is_current = map
            .get(&user_id)
            .is_some_and(|current| current.same_connection(conn));
        if is_current {
            map.remove(&user_id);
            set_ws_connections(map.len());
        }
        is_current
    }

    /// The user's current connection.
    pub fn get(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.read().get(&user_id).cloned()
    }

    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.read().contains_key(&user_id)
    }

    /// Queue a text frame for the user's current connection, if any.
    pub fn send_text(&self, user_id: UserId, text: &str) -> bool {
        match self.get(user_id) {
            Some(conn) => conn.send_text(text),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Close every connection. Used at shutdown.
    pub fn close_all(&self) {
        let all: Vec<ConnectionHandle> = self.read().values().cloned().collect();
        for conn in all {
            conn.close(CLOSE_GOING_AWAY, "Server shutting down");
        }
    }
}

/// Unregisters and closes a connection when dropped.
///
/// Held by the connection's reader loop so cleanup runs on every exit path,
/// including unwinding.
pub struct RegistrationGuard {
    registry: ConnectionRegistry,
    user_id: UserId,
    conn: ConnectionHandle,
}

impl RegistrationGuard {
    pub fn connection(&self) -> &ConnectionHandle {
        &self.conn
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        let removed = self.registry.unregister(self.user_id, &self.conn);
        self.conn.close(CLOSE_NORMAL, "");
        tracing::debug!(
            target: "clubhouse.ws.registry",
            user_id = %self.user_id,
            connection = self.conn.id(),
            removed,
            "Connection unregistered"
        );
    }
}
