//! Multi-room WebSocket chat relay library
//!
//! A real-time coordination core built with tokio-tungstenite: many
//! concurrent bidirectional event streams, room membership tracking, chat
//! relay with ordering guarantees, and derived presence state (who is
//! online, who is typing).
//!
//! # Features
//! - WebSocket connection handling
//! - Identity binding and room joining (free-form room names)
//! - Real-time chat relayed to the whole room, sender included
//! - Roster refreshes and join/leave system notices
//! - Debounced typing indicators with 1s auto-expiry
//! - Room switching with ordered departure/arrival announcements
//! - Disconnection handling through the same cleanup path as a leave
//!
//! # Architecture
//! Two tiers of actors communicating over `mpsc` channels, no locks:
//! - `ChatHub` is the arbiter actor owning connection identity; it routes
//!   each event to the coordinator of the room it addresses
//! - One `RoomCoordinator` actor per room serializes that room's
//!   membership, typing state, and broadcasts; separate rooms run in
//!   parallel
//! - Each connection has a `handler` task bridging its WebSocket to the hub
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use chat_relay::{ChatHub, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (hub_tx, hub_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatHub::new(hub_rx, hub_tx.clone()).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let hub_tx = hub_tx.clone();
//!         tokio::spawn(handle_connection(stream, hub_tx));
//!     }
//! }
//! ```

pub mod coordinator;
pub mod error;
pub mod event;
pub mod handler;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod room;
pub mod router;
pub mod typing;
pub mod types;

// Re-export main types for convenience
pub use coordinator::{RoomCommand, RoomCoordinator};
pub use error::{AppError, SendError};
pub use event::{ChatMessage, ClientEvent, ErrorCode, ServerEvent, UserInfo};
pub use handler::handle_connection;
pub use hub::{ChatHub, HubCommand};
pub use registry::{Connection, ConnectionRegistry};
pub use room::Room;
pub use router::MAX_MESSAGE_LEN;
pub use typing::{TypingTracker, TypingTransition, TYPING_TIMEOUT};
pub use types::{ConnectionId, RoomId};
