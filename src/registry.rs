//! Connection registry
//!
//! Tracks every live connection, the identity bound to it, and its current
//! room. The registry is the single source of truth for "which connection
//! is this"; rooms reference connections only by identifier.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::event::ServerEvent;
use crate::types::{ConnectionId, RoomId};

/// Channel used to push events back to one connection's transport task
pub type EventSender = mpsc::Sender<ServerEvent>;

/// One live connection
///
/// Holds the connection's unique ID, the username bound at join time,
/// the room it is currently seated in (at most one), and the outbound
/// event channel to its transport task.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Username (None until the first join binds one)
    pub username: Option<String>,
    /// Room this connection is currently seated in
    pub room: Option<RoomId>,
    /// Server → client event channel
    pub sender: EventSender,
}

impl Connection {
    /// Create a new connection with the given ID and sender channel
    pub fn new(id: ConnectionId, sender: EventSender) -> Self {
        Self {
            id,
            username: None,
            room: None,
            sender,
        }
    }

    /// Send an event to this connection
    ///
    /// Returns an error if the channel is closed (connection torn down).
    pub async fn send(&self, event: ServerEvent) -> Result<(), SendError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Get the display name for this connection
    ///
    /// Returns the username if bound, otherwise "Unknown".
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("Unknown")
    }
}

/// Registry of all live connections
///
/// Owned and mutated exclusively by the hub actor; no locking needed.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened connection
    pub fn register(&mut self, id: ConnectionId, sender: EventSender) {
        self.connections.insert(id, Connection::new(id, sender));
    }

    /// Bind a username to a registered connection
    ///
    /// No-op if the connection is gone (it may have raced a disconnect).
    pub fn bind_identity(&mut self, id: ConnectionId, username: String) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.username = Some(username);
        }
    }

    /// Remove a connection, returning its final state
    ///
    /// Idempotent: returns None if the connection was already absent,
    /// since disconnects can race explicit leaves.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Whether any registered connection is seated in the given room
    pub fn any_seated_in(&self, room: &RoomId) -> bool {
        self.connections
            .values()
            .any(|c| c.room.as_ref() == Some(room))
    }
}
