use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::models::{ClientMessage, Position, ServerMessage, WelcomeMessage};
use crate::websocket::msg_ping_handler::handle_ping_message;
use crate::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    pub role: Option<String>,
}

/// How a connection takes part in a room. A participant is tracked as a
/// marker and also receives the event stream; a viewer only watches.
#[derive(Clone, Copy, PartialEq)]
enum Role {
    Participant,
    Viewer,
}

/// WebSocket handler
pub async fn websocket_handler(
    Path(room_name): Path<String>,
    Query(params): Query<WsParams>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(app_state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("New WebSocket connection attempt for room '{}'", room_name);
    let role = match params.role.as_deref() {
        Some("viewer") => Role::Viewer,
        _ => Role::Participant,
    };
    let client_ip = client_ip(&headers, addr);
    ws.on_upgrade(move |socket| handle_socket(socket, room_name, role, client_ip, app_state))
}

/// Handle WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    room_name: String,
    role: Role,
    client_ip: IpAddr,
    app_state: Arc<AppState>,
) {
    // Attach to the room first so no change event emitted after this point
    // can be missed by this connection.
    let (room, viewer_id, mut events) = app_state.registry.attach_viewer(&room_name).await;

    // Split the socket into sender and receiver
    let (sender, mut receiver) = socket.split();

    // As we will need a reference to sender in multiple tasks, wrap it in an Arc and Mutex
    let sender1 = Arc::new(tokio::sync::Mutex::new(sender));
    let sender2 = sender1.clone();

    // Participants get a coordinator-assigned id, confirmed back before
    // their own add event can reach the socket, then enter the registry.
    let participant_id = match role {
        Role::Participant => {
            let id = Uuid::new_v4().to_string();
            info!(
                "Participant connection established for room '{}' with id {}",
                room_name, id
            );
            let welcome = ServerMessage::Welcome(WelcomeMessage { id: id.clone() });
            if send_message(&sender1, &welcome).await.is_err() {
                error!("Failed to send welcome for room '{}'", room_name);
                room.detach_viewer(viewer_id).await;
                app_state.registry.retire_if_empty(&room_name).await;
                return;
            }
            let position = resolve_position(&app_state, id.clone(), client_ip).await;
            room.participant_connected(position).await;
            Some(id)
        }
        Role::Viewer => {
            info!("Viewer connection established for room '{}'", room_name);
            None
        }
    };

    // Forward room events to the socket, one frame per event, in the order
    // the room committed them.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = events.recv().await {
            if send_message(&sender2, &msg).await.is_err() {
                break;
            }
        }
    });

    // Drain incoming frames. Viewers are read-only apart from keep-alive
    // pings; anything that fails to decode is dropped, not fatal.
    let recv_room = room_name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            let msg = match frame {
                Ok(msg) => msg,
                Err(e) => {
                    debug!("Transport error for room '{}': {}", recv_room, e);
                    break;
                }
            };
            let msg = match msg {
                Message::Text(msg) => msg,
                Message::Close(_) => break,
                // Binary and control frames are not part of the contract;
                // skip them and keep the connection alive.
                _ => continue,
            };
            let client_msg: ClientMessage = match serde_json::from_str(&msg) {
                Ok(client_msg) => client_msg,
                Err(e) => {
                    debug!(
                        "Discarding malformed message for room '{}': {}",
                        recv_room, e
                    );
                    continue;
                }
            };
            match client_msg {
                ClientMessage::Ping => {
                    handle_ping_message(&recv_room, &sender1).await;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    // Teardown order matters: this connection stops being a broadcast
    // recipient before its own departure is announced to the others.
    room.detach_viewer(viewer_id).await;
    if let Some(id) = participant_id {
        room.participant_disconnected(&id).await;
    }
    app_state.registry.retire_if_empty(&room_name).await;
    info!("WebSocket connection terminated for room '{}'", room_name);
}

/// Serialize and send one message down the shared sink.
pub(crate) async fn send_message(
    sender: &Arc<tokio::sync::Mutex<futures_util::stream::SplitSink<WebSocket, Message>>>,
    msg: &ServerMessage,
) -> Result<(), ()> {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize outgoing message: {}", e);
            return Ok(());
        }
    };
    sender
        .lock()
        .await
        .send(Message::Text(text))
        .await
        .map_err(|_| ())
}

/// Best client address we can see: first `x-forwarded-for` hop when behind
/// a proxy, the socket peer otherwise.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| addr.ip())
}

/// Resolve a connecting participant's Position. Geolocation is strictly
/// best-effort: no configured service, a private peer address or a failed
/// lookup all degrade to the unknown location, never to a refused
/// connection.
async fn resolve_position(app_state: &AppState, id: String, client_ip: IpAddr) -> Position {
    let Some(geo) = &app_state.geo else {
        return Position::unknown(id);
    };
    match geo.lookup(client_ip).await {
        Ok(location) => Position {
            id,
            lat: location.lat,
            lng: location.lng,
            city: location.city,
            country: location.country,
        },
        Err(e) => {
            debug!(
                "Geolocation failed for {}: {} - registering unknown location",
                client_ip, e
            );
            Position::unknown(id)
        }
    }
}
