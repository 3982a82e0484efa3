//! Event protocol definitions
//!
//! JSON-based bidirectional event protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Event names and payload
//! shapes follow the client contract (kebab-case names, `newRoom` field
//! spelling).

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Client → Server event
///
/// All events from client to server. Uses tagged enum with kebab-case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Bind identity and enter a room
    Join { username: String, room: String },
    /// Send a chat message to the current room
    SendMessage { content: String },
    /// Indicate typing started (or continued)
    Typing,
    /// Indicate typing stopped
    StopTyping,
    /// Leave the current room and enter another
    SwitchRoom {
        #[serde(rename = "newRoom")]
        new_room: String,
    },
}

/// A relayed chat message
///
/// Ephemeral: constructed at relay time, broadcast, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Server-assigned unique identifier
    pub id: String,
    /// Sender's bound username
    pub username: String,
    /// Trimmed message body
    pub content: String,
    /// Server-assigned RFC 3339 timestamp
    pub timestamp: String,
    /// Room the message was relayed to
    pub room: String,
}

/// One roster entry in a `room-users` refresh
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
}

/// Server → Client event
///
/// All events from server to client. Uses tagged enum with kebab-case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Chat message relayed to the room, sender included
    ReceiveMessage(ChatMessage),
    /// System notice: a user entered the room
    UserJoined { username: String, message: String },
    /// System notice: a user left the room
    UserLeft { username: String, message: String },
    /// Full roster refresh for the recipient's room
    RoomUsers { users: Vec<UserInfo> },
    /// A user in the room started typing
    UserTyping { username: String },
    /// A user in the room stopped typing
    UserStopTyping { username: String },
    /// Error indication, delivered only to the offending connection
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerEvent::Error
///
/// Represents the recoverable error kinds communicated to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed event or out-of-bounds field
    InvalidInput,
    /// Event addressed to a room the connection is not seated in
    NotAMember,
    /// Join from a connection that is already seated
    AlreadySeated,
}

/// Convert AppError to ServerEvent for client notification
impl From<AppError> for ServerEvent {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::InvalidInput(reason) => (ErrorCode::InvalidInput, reason.clone()),
            AppError::NotAMember => (
                ErrorCode::NotAMember,
                "You are not in that room".to_string(),
            ),
            AppError::AlreadySeated => (
                ErrorCode::AlreadySeated,
                "You are already in a room; use switch-room".to_string(),
            ),
            AppError::Json(e) => (
                ErrorCode::InvalidInput,
                format!("Invalid event format: {}", e),
            ),
            // Fatal errors are not typically converted (connection closes)
            _ => (ErrorCode::InvalidInput, "Internal error".to_string()),
        };
        ServerEvent::Error { code, message }
    }
}
