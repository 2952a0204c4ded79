//! WebSocket connection handler
//!
//! Handles individual socket connections: WebSocket handshake, forwarding
//! inbound frames to the hub, and writing queued envelopes back out.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

use crate::connection::Connection;
use crate::error::AppError;
use crate::events::EventSink;
use crate::server::HubHandle;

/// Bind the listening socket
///
/// Failure is reported on `events` before being returned; the caller has no
/// useful degraded mode without a listener.
pub async fn bind(addr: &str, events: &EventSink) -> Result<TcpListener, AppError> {
    TcpListener::bind(addr).await.map_err(|e| {
        events.error(
            "Server failed to start or crashed, please check the port is not in use",
            Some(json!({ "addr": addr, "error": e.to_string() })),
        );
        AppError::Io(e)
    })
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the connection with the hub,
/// and runs until either side closes. The hub is told about the close in
/// every case.
pub async fn handle_connection(stream: TcpStream, hub: HubHandle) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    hub.events()
        .debug(format!("Upgrade request received from {}", peer_addr));

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (connection, mut frame_rx) = Connection::channel(peer_addr);
    let id = connection.id;
    info!("Connection {} established from {}", id, connection.peer_addr);

    if hub.connect(connection).await.is_err() {
        error!("Failed to register connection {} - hub closed", id);
        return Err(AppError::ChannelSend);
    }

    let hub_read = hub.clone();

    // Read task (WebSocket -> Hub), in arrival order
    let mut read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            let raw = match msg_result {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", id);
                    break;
                }
                // Transport-level ping/pong is answered by tungstenite
                Ok(_) => continue,
                Err(e) => {
                    error!("WebSocket error for {}: {}", id, e);
                    break;
                }
            };

            if hub_read.inbound(id, raw).await.is_err() {
                debug!("Hub closed, ending read task for {}", id);
                break;
            }
        }
        debug!("Read task ended for {}", id);
    });

    // Write task (Hub -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                debug!("WebSocket send failed, ending write task");
                break;
            }
        }
        debug!("Write task ended for {}", id);

        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete, then stop the other one
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", id);
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", id);
        }
    }
    read_task.abort();
    write_task.abort();

    let _ = hub.closed(id).await;

    info!("Connection {} closed", id);

    Ok(())
}
