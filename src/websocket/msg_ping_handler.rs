use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::stream::SplitSink;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::{PongMessage, ServerMessage};
use crate::websocket::handler::send_message;

/// Handle an incoming keep-alive ping - reply with a pong.
pub async fn handle_ping_message(room_name: &str, sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>) {
    info!("Ping message received for room '{}'", room_name);

    let pong = ServerMessage::Pong(PongMessage {
        date: Utc::now().to_rfc3339(),
    });
    let _ = send_message(sender, &pong).await;
}
