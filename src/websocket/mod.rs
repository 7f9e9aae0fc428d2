use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod message_types;

/// Unique identifier for one socket connection
///
/// A user may hold several connections at once; each one joins rooms
/// independently and is cleaned up on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct Connection {
    /// Identity bound at handshake
    user_id: Uuid,
    sender: UnboundedSender<String>,
    rooms: HashSet<Uuid>,
}

#[derive(Default)]
struct RoomTable {
    connections: HashMap<ConnectionId, Connection>,
    // chat_id -> subscribed connections
    rooms: HashMap<Uuid, HashSet<ConnectionId>>,
}

impl RoomTable {
    fn drop_connection(&mut self, id: ConnectionId) -> bool {
        let Some(conn) = self.connections.remove(&id) else {
            return false;
        };
        for room in conn.rooms {
            if let Some(members) = self.rooms.get_mut(&room) {
                members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(&room);
                }
            }
        }
        true
    }
}

/// Room subscription table for real-time fan-out
///
/// Rooms are keyed by chat id. `join` and `leave` are the only operations
/// that change room membership; authorization happens before `join` is
/// called (see [`handlers::join_room`]).
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RoomTable>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection.
    ///
    /// Returns the connection id and the receiver that yields every payload
    /// published to rooms this connection joins.
    pub async fn register(&self, user_id: Uuid) -> (ConnectionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();

        let mut guard = self.inner.write().await;
        guard.connections.insert(
            id,
            Connection {
                user_id,
                sender: tx,
                rooms: HashSet::new(),
            },
        );
        crate::metrics::WS_CONNECTIONS.set(guard.connections.len() as i64);

        tracing::debug!(connection = %id, user_id = %user_id, "registered connection");
        (id, rx)
    }

    pub async fn user_of(&self, id: ConnectionId) -> Option<Uuid> {
        self.inner
            .read()
            .await
            .connections
            .get(&id)
            .map(|c| c.user_id)
    }

    /// Subscribe a connection to a room. Returns `false` for unknown
    /// connections.
    pub async fn join(&self, id: ConnectionId, chat_id: Uuid) -> bool {
        let mut guard = self.inner.write().await;
        let Some(conn) = guard.connections.get_mut(&id) else {
            return false;
        };
        conn.rooms.insert(chat_id);
        guard.rooms.entry(chat_id).or_default().insert(id);
        true
    }

    pub async fn leave(&self, id: ConnectionId, chat_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(conn) = guard.connections.get_mut(&id) {
            conn.rooms.remove(&chat_id);
        }
        if let Some(members) = guard.rooms.get_mut(&chat_id) {
            members.remove(&id);
            if members.is_empty() {
                guard.rooms.remove(&chat_id);
            }
        }
    }

    /// Drop a connection from every room it joined.
    ///
    /// Must be called when the socket closes.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut guard = self.inner.write().await;
        if guard.drop_connection(id) {
            tracing::debug!(connection = %id, "connection removed from registry");
        }
        crate::metrics::WS_CONNECTIONS.set(guard.connections.len() as i64);
    }

    /// Deliver `payload` to every connection in the room.
    ///
    /// Returns the number of connections reached. Dead senders are removed.
    pub async fn publish(&self, chat_id: Uuid, payload: String) -> usize {
        let mut guard = self.inner.write().await;
        let Some(members) = guard.rooms.get(&chat_id) else {
            return 0;
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for id in members {
            match guard.connections.get(id) {
                Some(conn) if conn.sender.send(payload.clone()).is_ok() => delivered += 1,
                _ => dead.push(*id),
            }
        }

        if !dead.is_empty() {
            tracing::debug!(
                chat_id = %chat_id,
                cleaned = dead.len(),
                "dropping dead connections during publish"
            );
            for id in dead {
                guard.drop_connection(id);
            }
            crate::metrics::WS_CONNECTIONS.set(guard.connections.len() as i64);
        }
        delivered
    }

    pub async fn subscriber_count(&self, chat_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(&chat_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub async fn is_subscribed(&self, id: ConnectionId, chat_id: Uuid) -> bool {
        self.inner
            .read()
            .await
            .rooms
            .get(&chat_id)
            .is_some_and(|m| m.contains(&id))
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}
