//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, event
//! parsing, and bidirectional communication with the ChatHub. Abrupt
//! socket termination feeds the same Disconnect command as a clean close.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::event::{ClientEvent, ServerEvent};
use crate::hub::HubCommand;
use crate::types::ConnectionId;

/// Outbound event channel capacity per connection
const EVENT_BUFFER_SIZE: usize = 32;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle.
pub async fn handle_connection(
    stream: TcpStream,
    hub_tx: mpsc::Sender<HubCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Generate connection ID
    let conn = ConnectionId::new();
    info!("Connection {} opened from {}", conn, peer_addr);

    // Create channel for server -> client events
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(EVENT_BUFFER_SIZE);

    // Register with the hub
    if hub_tx
        .send(HubCommand::Connect {
            conn,
            sender: event_tx.clone(),
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - hub closed", conn);
        return Err(AppError::ChannelSend);
    }

    // Clone hub_tx for read task
    let hub_tx_read = hub_tx.clone();

    // Spawn read task (WebSocket -> HubCommand)
    let read_task = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => {
                            let cmd = client_event_to_command(conn, event);
                            if hub_tx_read.send(cmd).await.is_err() {
                                debug!("Hub closed, ending read task for {}", conn);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", conn, e);
                            // Malformed input only ever affects this
                            // connection; answer it and keep reading
                            let _ = event_tx.send(AppError::Json(e).into()).await;
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", conn);
                    break;
                }
                Ok(Message::Ping(data)) => {
                    debug!("Ping from {}", conn);
                    // Pong is handled automatically by tungstenite
                    let _ = data; // Suppress unused warning
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", conn);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", conn, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", conn);
    });

    // Spawn write task (ServerEvent -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for connection");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", conn);
        }
        _ = write_task => {
            debug!("Write task completed for {}", conn);
        }
    }

    // Send disconnect command; cleanup runs even though no further
    // response can reach this connection
    let _ = hub_tx.send(HubCommand::Disconnect { conn }).await;

    info!("Connection {} closed", conn);

    Ok(())
}

/// Convert a ClientEvent to a HubCommand
fn client_event_to_command(conn: ConnectionId, event: ClientEvent) -> HubCommand {
    match event {
        ClientEvent::Join { username, room } => HubCommand::Join {
            conn,
            username,
            room,
        },
        ClientEvent::SendMessage { content } => HubCommand::SendMessage { conn, content },
        ClientEvent::Typing => HubCommand::Typing { conn },
        ClientEvent::StopTyping => HubCommand::StopTyping { conn },
        ClientEvent::SwitchRoom { new_room } => HubCommand::SwitchRoom { conn, new_room },
    }
}
