//! Message validation and construction
//!
//! Validates inbound chat content and stamps accepted messages with a
//! server-assigned identifier and timestamp. Membership checks and the
//! actual fan-out stay with the room coordinator, which owns the member
//! set.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::event::ChatMessage;
use crate::types::RoomId;

/// Maximum accepted message length, in characters after trimming
pub const MAX_MESSAGE_LEN: usize = 500;

/// Validate chat content
///
/// Returns the trimmed body, or `InvalidInput` when it is empty or longer
/// than [`MAX_MESSAGE_LEN`].
pub fn validate_content(content: &str) -> Result<&str, AppError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(
            "Message content must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::InvalidInput(format!(
            "Message content exceeds {} characters",
            MAX_MESSAGE_LEN
        )));
    }
    Ok(trimmed)
}

/// Construct the relayed message for validated content
///
/// Assigns a unique identifier and the wall-clock timestamp, RFC 3339 with
/// millisecond precision (the format the original client renders).
pub fn build_message(room: &RoomId, username: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        content: content.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        room: room.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_trimmed() {
        assert_eq!(validate_content("  hello  ").unwrap(), "hello");
    }

    #[test]
    fn test_empty_content_rejected() {
        assert!(matches!(
            validate_content(""),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_content("   \t\n"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_length_limit_in_chars() {
        let at_limit: String = "a".repeat(MAX_MESSAGE_LEN);
        assert!(validate_content(&at_limit).is_ok());

        let over_limit: String = "a".repeat(MAX_MESSAGE_LEN + 1);
        assert!(matches!(
            validate_content(&over_limit),
            Err(AppError::InvalidInput(_))
        ));

        // Multi-byte characters count as one unit each
        let wide: String = "あ".repeat(MAX_MESSAGE_LEN);
        assert!(validate_content(&wide).is_ok());
    }

    #[test]
    fn test_build_message_stamps_fields() {
        let room = RoomId::from("general");
        let msg = build_message(&room, "Alice", "hello");

        assert_eq!(msg.username, "Alice");
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.room, "general");
        assert!(!msg.id.is_empty());
        // RFC 3339 UTC with millisecond precision
        assert!(msg.timestamp.ends_with('Z'));
        assert!(msg.timestamp.contains('.'));

        let other = build_message(&room, "Alice", "hello");
        assert_ne!(msg.id, other.id);
    }
}
