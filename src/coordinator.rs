//! Room coordinator actor
//!
//! One coordinator task per room, owning that room's membership and typing
//! state. Commands arrive on the room's mpsc channel and are processed
//! strictly in arrival order; every broadcast a command triggers is fully
//! enqueued to the recipients before the next command is received, so
//! observers never see membership or typing updates out of causal order.
//! Different rooms run on different tasks and proceed in parallel.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::event::ServerEvent;
use crate::hub::HubCommand;
use crate::presence;
use crate::registry::EventSender;
use crate::room::Room;
use crate::router;
use crate::typing::{TypingTracker, TypingTransition, TYPING_TIMEOUT};
use crate::types::{ConnectionId, RoomId};

/// Command channel capacity per room
const ROOM_CHANNEL_SIZE: usize = 64;

/// Commands processed by a room's coordinator
///
/// `reply` channels carry error indications back to the offending
/// connection only; successful operations answer through broadcasts.
#[derive(Debug)]
pub enum RoomCommand {
    /// Seat a connection in this room
    Join {
        conn: ConnectionId,
        username: String,
        sender: EventSender,
    },
    /// Unseat a connection (explicit leave, switch-out, or disconnect)
    Leave { conn: ConnectionId },
    /// Relay a chat message from a seated connection
    SendMessage {
        conn: ConnectionId,
        content: String,
        reply: EventSender,
    },
    /// Typing signal from a seated connection
    Typing {
        conn: ConnectionId,
        reply: EventSender,
    },
    /// Explicit stop-typing signal
    StopTyping {
        conn: ConnectionId,
        reply: EventSender,
    },
    /// A typing expiry timer fired; stale generations are discarded
    TypingExpired { conn: ConnectionId, generation: u64 },
    /// Hub-confirmed shutdown of an idle room
    Shutdown,
}

/// The per-room coordinator actor
///
/// Serializes all mutations of one room's state. Spawned by the hub on the
/// first join of a room and shut down by the hub once the room has been
/// idle-confirmed empty.
pub struct RoomCoordinator {
    room: Room,
    typing: TypingTracker,
    receiver: mpsc::Receiver<RoomCommand>,
    /// Clone of our own command sender, handed to typing expiry timers
    self_tx: mpsc::Sender<RoomCommand>,
    /// Channel back to the hub, used to report this room idle
    hub_tx: mpsc::Sender<HubCommand>,
}

/// Spawn a coordinator task for the given room
///
/// Returns the command sender the hub routes through.
pub fn spawn_room(id: RoomId, hub_tx: mpsc::Sender<HubCommand>) -> mpsc::Sender<RoomCommand> {
    let (tx, rx) = mpsc::channel(ROOM_CHANNEL_SIZE);
    let coordinator = RoomCoordinator::new(id, rx, tx.clone(), hub_tx);
    tokio::spawn(coordinator.run());
    tx
}

impl RoomCoordinator {
    pub fn new(
        id: RoomId,
        receiver: mpsc::Receiver<RoomCommand>,
        self_tx: mpsc::Sender<RoomCommand>,
        hub_tx: mpsc::Sender<HubCommand>,
    ) -> Self {
        Self {
            room: Room::new(id),
            typing: TypingTracker::new(),
            receiver,
            self_tx,
            hub_tx,
        }
    }

    /// Run the coordinator event loop until the hub shuts this room down
    pub async fn run(mut self) {
        debug!("Room {} coordinator started", self.room.id);

        while let Some(cmd) = self.receiver.recv().await {
            if self.handle_command(cmd).await {
                break;
            }
        }

        debug!("Room {} coordinator stopped", self.room.id);
    }

    /// Process a single command; returns true when the actor should exit
    async fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                conn,
                username,
                sender,
            } => {
                self.handle_join(conn, username, sender).await;
            }
            RoomCommand::Leave { conn } => {
                self.handle_leave(conn).await;
            }
            RoomCommand::SendMessage {
                conn,
                content,
                reply,
            } => {
                self.handle_send_message(conn, content, reply).await;
            }
            RoomCommand::Typing { conn, reply } => {
                self.handle_typing(conn, reply).await;
            }
            RoomCommand::StopTyping { conn, reply } => {
                self.handle_stop_typing(conn, reply).await;
            }
            RoomCommand::TypingExpired { conn, generation } => {
                self.handle_typing_expired(conn, generation).await;
            }
            RoomCommand::Shutdown => {
                if self.room.is_empty() {
                    self.typing.clear();
                    return true;
                }
                // A join raced the idle report; the hub kept our handle
                warn!(
                    "Room {} shutdown refused: {} member(s) seated",
                    self.room.id,
                    self.room.member_count()
                );
            }
        }
        false
    }

    /// Seat a connection and announce it
    async fn handle_join(&mut self, conn: ConnectionId, username: String, sender: EventSender) {
        if !self.room.add_member(conn, username.clone(), sender.clone()) {
            warn!("Connection {} already seated in room {}", conn, self.room.id);
            let _ = sender.send(AppError::AlreadySeated.into()).await;
            return;
        }

        debug!("Connection {} joined room {}", conn, self.room.id);

        presence::broadcast(&self.room, &presence::joined_notice(&username)).await;
        presence::broadcast(&self.room, &presence::roster_event(&self.room)).await;
    }

    /// Unseat a connection and announce it to the remaining members
    ///
    /// No-op if the connection was not seated here (a leave can race a
    /// disconnect). A live typing indication is retired first so observers
    /// never see a typing user who is no longer on the roster.
    async fn handle_leave(&mut self, conn: ConnectionId) {
        if !self.room.contains(conn) {
            return;
        }

        self.retire_typing(conn).await;

        let Some(member) = self.room.remove_member(conn) else {
            return;
        };

        debug!("Connection {} left room {}", conn, self.room.id);

        presence::broadcast(&self.room, &presence::left_notice(&member.username)).await;
        presence::broadcast(&self.room, &presence::roster_event(&self.room)).await;

        if self.room.is_empty() {
            // Detached so an idle report can never block this task against
            // a hub that is itself mid-send into our channel
            let hub_tx = self.hub_tx.clone();
            let room = self.room.id.clone();
            tokio::spawn(async move {
                let _ = hub_tx.send(HubCommand::RoomIdle { room }).await;
            });
        }
    }

    /// Validate, stamp, and relay a chat message to the whole room
    async fn handle_send_message(&mut self, conn: ConnectionId, content: String, reply: EventSender) {
        let Some(member) = self.room.member(conn) else {
            let _ = reply.send(AppError::NotAMember.into()).await;
            return;
        };

        let body = match router::validate_content(&content) {
            Ok(body) => body,
            Err(err) => {
                let _ = reply.send(err.into()).await;
                return;
            }
        };

        let message = router::build_message(&self.room.id, &member.username, body);

        // Sending a message implicitly ends the typing indication
        self.retire_typing(conn).await;

        presence::broadcast(&self.room, &ServerEvent::ReceiveMessage(message)).await;
    }

    /// Typing signal: announce the first of a burst, re-arm on the rest
    async fn handle_typing(&mut self, conn: ConnectionId, reply: EventSender) {
        let Some(member) = self.room.member(conn) else {
            let _ = reply.send(AppError::NotAMember.into()).await;
            return;
        };
        let username = member.username.clone();

        let self_tx = self.self_tx.clone();
        let transition = self.typing.note_typing(conn, move |generation| {
            tokio::spawn(async move {
                tokio::time::sleep(TYPING_TIMEOUT).await;
                let _ = self_tx
                    .send(RoomCommand::TypingExpired { conn, generation })
                    .await;
            })
        });

        if transition == TypingTransition::Started {
            presence::broadcast_except(&self.room, conn, &ServerEvent::UserTyping { username })
                .await;
        }
    }

    /// Explicit stop-typing signal
    async fn handle_stop_typing(&mut self, conn: ConnectionId, reply: EventSender) {
        if !self.room.contains(conn) {
            let _ = reply.send(AppError::NotAMember.into()).await;
            return;
        }
        self.retire_typing(conn).await;
    }

    /// Auto-expiry after silence, routed back through our own channel
    async fn handle_typing_expired(&mut self, conn: ConnectionId, generation: u64) {
        if self.typing.note_expired(conn, generation) != TypingTransition::Stopped {
            return;
        }
        let Some(member) = self.room.member(conn) else {
            return;
        };
        let username = member.username.clone();
        presence::broadcast_except(&self.room, conn, &ServerEvent::UserStopTyping { username })
            .await;
    }

    /// Retire a live typing indication, if any, announcing the stop
    async fn retire_typing(&mut self, conn: ConnectionId) {
        if self.typing.note_stop(conn) != TypingTransition::Stopped {
            return;
        }
        let Some(member) = self.room.member(conn) else {
            return;
        };
        let username = member.username.clone();
        presence::broadcast_except(&self.room, conn, &ServerEvent::UserStopTyping { username })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ErrorCode;
    use tokio::sync::mpsc::Receiver;

    struct TestRoom {
        tx: mpsc::Sender<RoomCommand>,
        hub_rx: Receiver<HubCommand>,
    }

    fn spawn_test_room(name: &str) -> TestRoom {
        let (hub_tx, hub_rx) = mpsc::channel(16);
        let tx = spawn_room(RoomId::from(name), hub_tx);
        TestRoom { tx, hub_rx }
    }

    async fn join(
        room: &TestRoom,
        username: &str,
    ) -> (ConnectionId, Receiver<ServerEvent>, EventSender) {
        let conn = ConnectionId::new();
        let (tx, rx) = mpsc::channel(32);
        room.tx
            .send(RoomCommand::Join {
                conn,
                username: username.to_string(),
                sender: tx.clone(),
            })
            .await
            .unwrap();
        (conn, rx, tx)
    }

    /// Drain the two join broadcasts (notice + roster) a fresh member sees
    async fn drain_join(rx: &mut Receiver<ServerEvent>) {
        assert!(matches!(rx.recv().await.unwrap(), ServerEvent::UserJoined { .. }));
        assert!(matches!(rx.recv().await.unwrap(), ServerEvent::RoomUsers { .. }));
    }

    #[tokio::test]
    async fn test_join_announces_notice_then_roster() {
        let room = spawn_test_room("general");
        let (_a, mut rx_a, _tx_a) = join(&room, "Alice").await;

        match rx_a.recv().await.unwrap() {
            ServerEvent::UserJoined { username, message } => {
                assert_eq!(username, "Alice");
                assert_eq!(message, "Alice joined the room");
            }
            other => panic!("Expected user-joined, got {:?}", other),
        }
        match rx_a.recv().await.unwrap() {
            ServerEvent::RoomUsers { users } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].username, "Alice");
            }
            other => panic!("Expected room-users, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_join_refreshes_everyone() {
        let room = spawn_test_room("general");
        let (_a, mut rx_a, _tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;

        let (_b, mut rx_b, _tx_b) = join(&room, "Bob").await;

        // Existing member sees the notice and the two-entry roster
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerEvent::UserJoined { .. }
        ));
        match rx_a.recv().await.unwrap() {
            ServerEvent::RoomUsers { users } => {
                let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
                assert_eq!(names, vec!["Alice", "Bob"]);
            }
            other => panic!("Expected room-users, got {:?}", other),
        }

        // So does the joiner itself
        drain_join(&mut rx_b).await;
    }

    #[tokio::test]
    async fn test_message_echoed_to_all_including_sender() {
        let room = spawn_test_room("general");
        let (a, mut rx_a, tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;
        let (_b, mut rx_b, _tx_b) = join(&room, "Bob").await;
        rx_a.recv().await.unwrap();
        rx_a.recv().await.unwrap();
        drain_join(&mut rx_b).await;

        room.tx
            .send(RoomCommand::SendMessage {
                conn: a,
                content: "hello".to_string(),
                reply: tx_a,
            })
            .await
            .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await.unwrap() {
                ServerEvent::ReceiveMessage(msg) => {
                    assert_eq!(msg.content, "hello");
                    assert_eq!(msg.username, "Alice");
                    assert_eq!(msg.room, "general");
                    assert!(!msg.id.is_empty());
                    assert!(!msg.timestamp.is_empty());
                }
                other => panic!("Expected receive-message, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_message_from_non_member_rejected() {
        let room = spawn_test_room("general");
        let (_a, mut rx_a, _tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;

        let outsider = ConnectionId::new();
        let (reply_tx, mut reply_rx) = mpsc::channel(8);
        room.tx
            .send(RoomCommand::SendMessage {
                conn: outsider,
                content: "spoofed".to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();

        match reply_rx.recv().await.unwrap() {
            ServerEvent::Error { code, .. } => assert!(matches!(code, ErrorCode::NotAMember)),
            other => panic!("Expected error, got {:?}", other),
        }
        // The seated member saw nothing
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_message_rejected_without_broadcast() {
        let room = spawn_test_room("general");
        let (a, mut rx_a, tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;

        room.tx
            .send(RoomCommand::SendMessage {
                conn: a,
                content: "   ".to_string(),
                reply: tx_a,
            })
            .await
            .unwrap();

        match rx_a.recv().await.unwrap() {
            ServerEvent::Error { code, .. } => assert!(matches!(code, ErrorCode::InvalidInput)),
            other => panic!("Expected error, got {:?}", other),
        }
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_typing_announced_once_per_burst() {
        let room = spawn_test_room("general");
        let (a, mut rx_a, tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;
        let (_b, mut rx_b, _tx_b) = join(&room, "Bob").await;
        rx_a.recv().await.unwrap();
        rx_a.recv().await.unwrap();
        drain_join(&mut rx_b).await;

        for _ in 0..3 {
            room.tx
                .send(RoomCommand::Typing {
                    conn: a,
                    reply: tx_a.clone(),
                })
                .await
                .unwrap();
        }

        match rx_b.recv().await.unwrap() {
            ServerEvent::UserTyping { username } => assert_eq!(username, "Alice"),
            other => panic!("Expected user-typing, got {:?}", other),
        }
        // The burst produced no further typing events, and the typist
        // itself never hears about its own typing
        assert!(rx_b.try_recv().is_err());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_expires_after_silence() {
        let room = spawn_test_room("general");
        let (a, mut rx_a, tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;
        let (_b, mut rx_b, _tx_b) = join(&room, "Bob").await;
        rx_a.recv().await.unwrap();
        rx_a.recv().await.unwrap();
        drain_join(&mut rx_b).await;

        // Three keystrokes 200ms apart, then silence
        for _ in 0..3 {
            room.tx
                .send(RoomCommand::Typing {
                    conn: a,
                    reply: tx_a.clone(),
                })
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }

        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::UserTyping { .. }
        ));

        // The expiry runs 1000ms after the last keystroke
        match rx_b.recv().await.unwrap() {
            ServerEvent::UserStopTyping { username } => assert_eq!(username, "Alice"),
            other => panic!("Expected user-stop-typing, got {:?}", other),
        }
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystroke_rearms_expiry() {
        let room = spawn_test_room("general");
        let (a, mut rx_a, tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;
        let (_b, mut rx_b, _tx_b) = join(&room, "Bob").await;
        rx_a.recv().await.unwrap();
        rx_a.recv().await.unwrap();
        drain_join(&mut rx_b).await;

        room.tx
            .send(RoomCommand::Typing {
                conn: a,
                reply: tx_a.clone(),
            })
            .await
            .unwrap();
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::UserTyping { .. }
        ));

        // 900ms later a keystroke re-arms the window
        tokio::time::sleep(std::time::Duration::from_millis(900)).await;
        room.tx
            .send(RoomCommand::Typing {
                conn: a,
                reply: tx_a.clone(),
            })
            .await
            .unwrap();

        // 900ms after the re-arm the original deadline has long passed,
        // yet the indication still stands
        tokio::time::sleep(std::time::Duration::from_millis(900)).await;
        assert!(rx_b.try_recv().is_err());

        // The re-armed deadline fires at 1000ms
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::UserStopTyping { .. }
        ));
    }

    #[tokio::test]
    async fn test_message_send_retires_typing_first() {
        let room = spawn_test_room("general");
        let (a, mut rx_a, tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;
        let (_b, mut rx_b, _tx_b) = join(&room, "Bob").await;
        rx_a.recv().await.unwrap();
        rx_a.recv().await.unwrap();
        drain_join(&mut rx_b).await;

        room.tx
            .send(RoomCommand::Typing {
                conn: a,
                reply: tx_a.clone(),
            })
            .await
            .unwrap();
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::UserTyping { .. }
        ));

        room.tx
            .send(RoomCommand::SendMessage {
                conn: a,
                content: "done typing".to_string(),
                reply: tx_a,
            })
            .await
            .unwrap();

        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::UserStopTyping { .. }
        ));
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::ReceiveMessage(_)
        ));
    }

    #[tokio::test]
    async fn test_leave_mid_typing_stops_then_announces() {
        let room = spawn_test_room("general");
        let (a, mut rx_a, tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;
        let (_b, mut rx_b, _tx_b) = join(&room, "Bob").await;
        rx_a.recv().await.unwrap();
        rx_a.recv().await.unwrap();
        drain_join(&mut rx_b).await;

        room.tx
            .send(RoomCommand::Typing {
                conn: a,
                reply: tx_a,
            })
            .await
            .unwrap();
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::UserTyping { .. }
        ));

        room.tx.send(RoomCommand::Leave { conn: a }).await.unwrap();

        // Typing is retired before the departure is announced
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::UserStopTyping { .. }
        ));
        match rx_b.recv().await.unwrap() {
            ServerEvent::UserLeft { username, message } => {
                assert_eq!(username, "Alice");
                assert_eq!(message, "Alice left the room");
            }
            other => panic!("Expected user-left, got {:?}", other),
        }
        match rx_b.recv().await.unwrap() {
            ServerEvent::RoomUsers { users } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].username, "Bob");
            }
            other => panic!("Expected room-users, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_leave_of_unknown_connection_is_noop() {
        let room = spawn_test_room("general");
        let (_a, mut rx_a, _tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;

        room.tx
            .send(RoomCommand::Leave {
                conn: ConnectionId::new(),
            })
            .await
            .unwrap();

        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_last_leave_reports_idle() {
        let mut room = spawn_test_room("general");
        let (a, mut rx_a, _tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;

        room.tx.send(RoomCommand::Leave { conn: a }).await.unwrap();

        match room.hub_rx.recv().await.unwrap() {
            HubCommand::RoomIdle { room } => assert_eq!(room.as_str(), "general"),
            other => panic!("Expected RoomIdle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_refused_while_members_seated() {
        let room = spawn_test_room("general");
        let (a, mut rx_a, tx_a) = join(&room, "Alice").await;
        drain_join(&mut rx_a).await;

        room.tx.send(RoomCommand::Shutdown).await.unwrap();

        // The coordinator is still alive and serving
        room.tx
            .send(RoomCommand::SendMessage {
                conn: a,
                content: "still here".to_string(),
                reply: tx_a,
            })
            .await
            .unwrap();
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerEvent::ReceiveMessage(_)
        ));
    }
}
