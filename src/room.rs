//! Room membership state
//!
//! Holds the member set for one room. Owned and mutated exclusively by the
//! room's coordinator task; members are referenced by connection identifier
//! plus a clone of their outbound event channel, never by owning the
//! connection itself.

use std::time::Instant;

use crate::registry::EventSender;
use crate::types::{ConnectionId, RoomId};

/// One seated member of a room
#[derive(Debug)]
pub struct Member {
    pub id: ConnectionId,
    pub username: String,
    pub sender: EventSender,
}

/// A chat room's membership
///
/// Members are kept in join order so roster broadcasts stay visually stable
/// for clients across refreshes.
#[derive(Debug)]
pub struct Room {
    /// Room identifier
    pub id: RoomId,
    /// Members in join order
    members: Vec<Member>,
    /// Room creation time
    pub created_at: Instant,
}

impl Room {
    /// Create a new empty room
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: Vec::new(),
            created_at: Instant::now(),
        }
    }

    /// Add a member to the room
    ///
    /// Returns false if the connection is already seated here.
    pub fn add_member(&mut self, id: ConnectionId, username: String, sender: EventSender) -> bool {
        if self.contains(id) {
            return false;
        }
        self.members.push(Member {
            id,
            username,
            sender,
        });
        true
    }

    /// Remove a member from the room
    ///
    /// Returns the removed member, or None if the connection was not seated
    /// here (leaves can race disconnects; that is not an error).
    pub fn remove_member(&mut self, id: ConnectionId) -> Option<Member> {
        let pos = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(pos))
    }

    /// Check if a connection is seated in this room
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    /// Look up a member by connection identifier
    pub fn member(&self, id: ConnectionId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Iterate members in join order
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    /// Number of seated members
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if the room has no members left
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sender() -> EventSender {
        let (tx, _rx) = mpsc::channel(8);
        tx
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new(RoomId::from("general"));
        assert_eq!(room.id.as_str(), "general");
        assert!(room.is_empty());
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn test_add_and_remove_member() {
        let mut room = Room::new(RoomId::from("general"));
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        assert!(room.add_member(a, "Alice".to_string(), sender()));
        assert!(room.add_member(b, "Bob".to_string(), sender()));
        assert_eq!(room.member_count(), 2);
        assert!(room.contains(a));

        // Double-join of the same connection is refused
        assert!(!room.add_member(a, "Alice".to_string(), sender()));
        assert_eq!(room.member_count(), 2);

        let removed = room.remove_member(a).unwrap();
        assert_eq!(removed.username, "Alice");
        assert!(!room.contains(a));

        // Removing again is a no-op
        assert!(room.remove_member(a).is_none());
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_members_keep_join_order() {
        let mut room = Room::new(RoomId::from("general"));
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();

        room.add_member(a, "Alice".to_string(), sender());
        room.add_member(b, "Bob".to_string(), sender());
        room.add_member(c, "Carol".to_string(), sender());
        room.remove_member(b);

        let names: Vec<&str> = room.members().map(|m| m.username.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Carol"]);
    }
}
