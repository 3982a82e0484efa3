//! Presence broadcasts
//!
//! Builds the derived-presence events a membership change produces (join
//! and leave system notices, full roster refreshes) and fans events out to
//! a room's current members. Send failures are ignored: a member whose
//! channel is gone is about to be cleaned up by its own disconnect path.

use crate::event::{ServerEvent, UserInfo};
use crate::room::Room;
use crate::types::ConnectionId;

/// Build a `room-users` roster refresh for the room's current membership
///
/// The snapshot is taken once per broadcast, so every recipient sees the
/// identical list in the identical (join) order.
pub fn roster_event(room: &Room) -> ServerEvent {
    let users = room
        .members()
        .map(|m| UserInfo {
            id: m.id.to_string(),
            username: m.username.clone(),
        })
        .collect();
    ServerEvent::RoomUsers { users }
}

/// Build the `user-joined` system notice
pub fn joined_notice(username: &str) -> ServerEvent {
    ServerEvent::UserJoined {
        username: username.to_string(),
        message: format!("{} joined the room", username),
    }
}

/// Build the `user-left` system notice
pub fn left_notice(username: &str) -> ServerEvent {
    ServerEvent::UserLeft {
        username: username.to_string(),
        message: format!("{} left the room", username),
    }
}

/// Send an event to every member of the room, in join order
pub async fn broadcast(room: &Room, event: &ServerEvent) {
    for member in room.members() {
        let _ = member.sender.send(event.clone()).await;
    }
}

/// Send an event to every member of the room except one connection
pub async fn broadcast_except(room: &Room, except: ConnectionId, event: &ServerEvent) {
    for member in room.members() {
        if member.id == except {
            continue;
        }
        let _ = member.sender.send(event.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoomId;
    use tokio::sync::mpsc;

    #[test]
    fn test_notice_texts() {
        match joined_notice("Alice") {
            ServerEvent::UserJoined { username, message } => {
                assert_eq!(username, "Alice");
                assert_eq!(message, "Alice joined the room");
            }
            _ => panic!("Wrong variant"),
        }
        match left_notice("Bob") {
            ServerEvent::UserLeft { username, message } => {
                assert_eq!(username, "Bob");
                assert_eq!(message, "Bob left the room");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_roster_snapshot() {
        let mut room = Room::new(RoomId::from("general"));
        let (tx, _rx) = mpsc::channel(8);
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        room.add_member(a, "Alice".to_string(), tx.clone());
        room.add_member(b, "Bob".to_string(), tx);

        match roster_event(&room) {
            ServerEvent::RoomUsers { users } => {
                assert_eq!(users.len(), 2);
                assert_eq!(users[0].username, "Alice");
                assert_eq!(users[0].id, a.to_string());
                assert_eq!(users[1].username, "Bob");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_origin() {
        let mut room = Room::new(RoomId::from("general"));
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        room.add_member(a, "Alice".to_string(), tx_a);
        room.add_member(b, "Bob".to_string(), tx_b);

        broadcast_except(&room, a, &joined_notice("Alice")).await;

        assert!(rx_a.try_recv().is_err());
        assert!(matches!(
            rx_b.try_recv().unwrap(),
            ServerEvent::UserJoined { .. }
        ));
    }
}
