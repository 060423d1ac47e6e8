use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::dispatcher::PresenceDispatcher;
use crate::registry::ConnectionHandle;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Caller-supplied client identifier; empty when omitted, never validated
    #[serde(default)]
    pub client_id: String,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query),
    fields(client_id = %query.client_id)
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    // A refused handshake never reaches the registry: if the upgrade fails,
    // the callback below is never invoked and no lifecycle starts.
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.client_id))
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state), fields(client_id = %client_id))]
async fn handle_socket(socket: WebSocket, state: AppState, client_id: String) {
    // Create channel for sending envelopes to this connection
    let (tx, mut rx) = mpsc::channel(state.settings.websocket.channel_buffer);
    let handle = Arc::new(ConnectionHandle::new(client_id.clone(), tx));
    let connection_id = handle.id;

    // Register and announce; the new connection is in the snapshot of its
    // own connect broadcast
    match state.dispatcher.connect(handle.clone()).await {
        Ok(result) => {
            tracing::info!(
                connection_id = %connection_id,
                delivered = result.delivered_to,
                "WebSocket connection established"
            );
        }
        Err(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "Connection rejected");
            let mut socket = socket;
            let _ = socket.close().await;
            return;
        }
    }

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for forwarding envelopes from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize envelope");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task for the receive loop: every inbound frame until the peer
    // disconnects, each text signal handed to the dispatcher
    let dispatcher = state.dispatcher.clone();
    let loop_client_id = client_id.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_frame(msg, &dispatcher, &loop_client_id).await {
                        break;
                    }
                }
                Err(e) => {
                    // Abrupt transport failure collapses to the disconnect
                    // path, same as a clean close
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    // Terminal lifecycle step: deregister and announce, exactly once
    match state.dispatcher.disconnect(&handle).await {
        Ok(result) => {
            tracing::info!(
                connection_id = %connection_id,
                delivered = result.delivered_to,
                "WebSocket connection closed"
            );
        }
        Err(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "Disconnect failed");
        }
    }
}

/// Process a received WebSocket frame
/// Returns false if the connection should be closed
async fn process_frame(msg: Message, dispatcher: &PresenceDispatcher, client_id: &str) -> bool {
    match msg {
        Message::Text(text) => {
            dispatcher.signal(client_id, &text).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings automatically
            true
        }
        Message::Binary(_) => {
            // Only text frames carry signals
            true
        }
        Message::Close(_) => {
            tracing::debug!(client_id = %client_id, "Received close frame");
            false
        }
    }
}
