//! Realtime websocket endpoint.
//!
//! Connection lifecycle: on upgrade the server sends the `connected`
//! acknowledgement, registers the socket with the broadcast hub, and forwards
//! hub messages until the client disconnects or a send fails. Either way the
//! connection is removed from the hub; no reconnection is initiated
//! server-side.

use crate::handlers::AppState;
use crate::realtime::{connected_message, BroadcastHub};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

/// GET /ws/realtime - upgrade to the realtime update channel.
pub async fn ws_realtime(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (mut sender, mut receiver) = socket.split();

    // Acknowledge before entering the active set; if even this fails the
    // connection never becomes active.
    if sender
        .send(Message::Text(connected_message()))
        .await
        .is_err()
    {
        return;
    }

    let (id, mut outbound) = hub.add();

    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // Hub dropped this connection after a failed send.
                None => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // No client-to-server messages are defined on this channel.
                Some(Ok(_)) => {}
            },
        }
    }

    hub.remove(id);
}
