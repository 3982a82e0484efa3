//! ChatHub arbiter actor
//!
//! The single routing actor the transport layer talks to. Owns the
//! connection registry and the table of live room coordinators; resolves
//! each decoded client event against the sending connection's state and
//! forwards a command to the addressed room's coordinator. Room switching
//! is decomposed here — a `Leave` enqueued to the old room, then a `Join`
//! enqueued to the new one, from this one task — so the two announcements
//! always land in that order and the connection is never seated twice.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::coordinator::{spawn_room, RoomCommand};
use crate::error::AppError;
use crate::registry::{ConnectionRegistry, EventSender};
use crate::types::{ConnectionId, RoomId};

/// Commands sent from transport handlers (and room coordinators) to the hub
#[derive(Debug)]
pub enum HubCommand {
    /// New connection opened
    Connect {
        conn: ConnectionId,
        sender: EventSender,
    },
    /// Connection closed, normally or abruptly
    Disconnect { conn: ConnectionId },
    /// Bind identity and seat the connection in a room
    Join {
        conn: ConnectionId,
        username: String,
        room: String,
    },
    /// Relay a chat message to the connection's current room
    SendMessage { conn: ConnectionId, content: String },
    /// Typing signal for the connection's current room
    Typing { conn: ConnectionId },
    /// Explicit stop-typing signal
    StopTyping { conn: ConnectionId },
    /// Move the connection from its current room to another
    SwitchRoom { conn: ConnectionId, new_room: String },
    /// A room coordinator reports its membership hit zero
    RoomIdle { room: RoomId },
}

/// The hub actor
///
/// All connection-identity state and event routing goes through this one
/// task; per-room state lives with the room coordinators it spawns.
pub struct ChatHub {
    /// All live connections
    registry: ConnectionRegistry,
    /// Live room coordinators: RoomId -> command channel
    rooms: HashMap<RoomId, mpsc::Sender<RoomCommand>>,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
    /// Clone of our own sender, handed to room coordinators for idle reports
    self_tx: mpsc::Sender<HubCommand>,
}

impl ChatHub {
    /// Create a new hub with its command receiver and a clone of the
    /// matching sender
    pub fn new(receiver: mpsc::Receiver<HubCommand>, self_tx: mpsc::Sender<HubCommand>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: HashMap::new(),
            receiver,
            self_tx,
        }
    }

    /// Run the hub event loop
    ///
    /// Continuously receives and processes commands until all senders are
    /// dropped.
    pub async fn run(mut self) {
        info!("ChatHub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("ChatHub shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { conn, sender } => {
                self.handle_connect(conn, sender);
            }
            HubCommand::Disconnect { conn } => {
                self.handle_disconnect(conn).await;
            }
            HubCommand::Join {
                conn,
                username,
                room,
            } => {
                self.handle_join(conn, username, room).await;
            }
            HubCommand::SendMessage { conn, content } => {
                self.handle_send_message(conn, content).await;
            }
            HubCommand::Typing { conn } => {
                self.handle_typing(conn).await;
            }
            HubCommand::StopTyping { conn } => {
                self.handle_stop_typing(conn).await;
            }
            HubCommand::SwitchRoom { conn, new_room } => {
                self.handle_switch_room(conn, new_room).await;
            }
            HubCommand::RoomIdle { room } => {
                self.handle_room_idle(room).await;
            }
        }
    }

    /// Handle new connection registration
    fn handle_connect(&mut self, conn: ConnectionId, sender: EventSender) {
        info!("Connection {} opened", conn);
        self.registry.register(conn, sender);
        debug!(
            "Total connections: {}, live rooms: {}",
            self.registry.len(),
            self.rooms.len()
        );
    }

    /// Handle connection teardown
    ///
    /// Runs the same cleanup path as an explicit leave for whatever room the
    /// connection occupied, exactly once; idempotent if already gone.
    async fn handle_disconnect(&mut self, conn: ConnectionId) {
        let Some(connection) = self.registry.unregister(conn) else {
            return;
        };
        info!("Connection {} closed", conn);

        if let Some(room) = connection.room {
            self.route(&room, RoomCommand::Leave { conn }).await;
        }

        debug!(
            "Total connections: {}, live rooms: {}",
            self.registry.len(),
            self.rooms.len()
        );
    }

    /// Handle a join: bind identity, seat the connection
    async fn handle_join(&mut self, conn: ConnectionId, username: String, room: String) {
        let username = username.trim().to_string();
        let room = room.trim().to_string();

        if username.is_empty() || room.is_empty() {
            self.notify_error(
                conn,
                AppError::InvalidInput("join requires a username and a room".to_string()),
            )
            .await;
            return;
        }

        let Some(connection) = self.registry.get(conn) else {
            return;
        };

        if connection.room.is_some() {
            self.notify_error(conn, AppError::AlreadySeated).await;
            return;
        }

        let sender = connection.sender.clone();
        let room_id = RoomId::from(room);

        self.registry.bind_identity(conn, username.clone());
        if let Some(connection) = self.registry.get_mut(conn) {
            connection.room = Some(room_id.clone());
        }

        info!("Connection {} joins room {} as '{}'", conn, room_id, username);

        let room_tx = self.room_sender(&room_id);
        if room_tx
            .send(RoomCommand::Join {
                conn,
                username,
                sender,
            })
            .await
            .is_err()
        {
            warn!("Room {} coordinator unavailable", room_id);
        }
    }

    /// Handle a chat message against the connection's current room
    async fn handle_send_message(&mut self, conn: ConnectionId, content: String) {
        let Some((room, reply)) = self.seat_of(conn) else {
            self.notify_error(conn, AppError::NotAMember).await;
            return;
        };
        self.route(
            &room,
            RoomCommand::SendMessage {
                conn,
                content,
                reply,
            },
        )
        .await;
    }

    /// Handle a typing signal against the connection's current room
    async fn handle_typing(&mut self, conn: ConnectionId) {
        let Some((room, reply)) = self.seat_of(conn) else {
            self.notify_error(conn, AppError::NotAMember).await;
            return;
        };
        self.route(&room, RoomCommand::Typing { conn, reply }).await;
    }

    /// Handle an explicit stop-typing signal
    async fn handle_stop_typing(&mut self, conn: ConnectionId) {
        let Some((room, reply)) = self.seat_of(conn) else {
            self.notify_error(conn, AppError::NotAMember).await;
            return;
        };
        self.route(&room, RoomCommand::StopTyping { conn, reply })
            .await;
    }

    /// Handle a room switch: leave the old room, then join the new one
    async fn handle_switch_room(&mut self, conn: ConnectionId, new_room: String) {
        let new_room = new_room.trim().to_string();
        if new_room.is_empty() {
            self.notify_error(
                conn,
                AppError::InvalidInput("switch-room requires a room".to_string()),
            )
            .await;
            return;
        }

        let Some(connection) = self.registry.get(conn) else {
            return;
        };
        let Some(old_room) = connection.room.clone() else {
            self.notify_error(conn, AppError::NotAMember).await;
            return;
        };

        let new_room = RoomId::from(new_room);
        if new_room == old_room {
            return;
        }

        let username = connection.display_name().to_string();
        let sender = connection.sender.clone();

        if let Some(connection) = self.registry.get_mut(conn) {
            connection.room = Some(new_room.clone());
        }

        info!(
            "Connection {} switches from room {} to room {}",
            conn, old_room, new_room
        );

        // Leave is enqueued before Join, so the old room's departure
        // announcements precede the new room's arrival announcements
        self.route(&old_room, RoomCommand::Leave { conn }).await;

        let room_tx = self.room_sender(&new_room);
        if room_tx
            .send(RoomCommand::Join {
                conn,
                username,
                sender,
            })
            .await
            .is_err()
        {
            warn!("Room {} coordinator unavailable", new_room);
        }
    }

    /// Handle an idle report from a room coordinator
    ///
    /// A join processed after the room emptied but before this report wins:
    /// the connection is already mapped to the room, so the coordinator is
    /// kept.
    async fn handle_room_idle(&mut self, room: RoomId) {
        if self.registry.any_seated_in(&room) {
            return;
        }
        if let Some(room_tx) = self.rooms.remove(&room) {
            debug!("Room {} shut down (empty)", room);
            let _ = room_tx.send(RoomCommand::Shutdown).await;
        }
    }

    /// Helper: the connection's current room plus a reply channel for errors
    fn seat_of(&self, conn: ConnectionId) -> Option<(RoomId, EventSender)> {
        let connection = self.registry.get(conn)?;
        let room = connection.room.clone()?;
        Some((room, connection.sender.clone()))
    }

    /// Helper: forward a command to a live room coordinator
    async fn route(&mut self, room: &RoomId, cmd: RoomCommand) {
        let Some(room_tx) = self.rooms.get(room) else {
            warn!("No coordinator for room {}", room);
            return;
        };
        if room_tx.send(cmd).await.is_err() {
            warn!("Room {} coordinator unavailable", room);
        }
    }

    /// Helper: get the room's command channel, spawning the coordinator on
    /// first use
    fn room_sender(&mut self, room: &RoomId) -> mpsc::Sender<RoomCommand> {
        if let Some(room_tx) = self.rooms.get(room) {
            return room_tx.clone();
        }
        debug!("Spawning coordinator for room {}", room);
        let room_tx = spawn_room(room.clone(), self.self_tx.clone());
        self.rooms.insert(room.clone(), room_tx.clone());
        room_tx
    }

    /// Helper: send an error indication to one connection only
    async fn notify_error(&self, conn: ConnectionId, err: AppError) {
        if let Some(connection) = self.registry.get(conn) {
            let _ = connection.send(err.into()).await;
        }
    }
}
