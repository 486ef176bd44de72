use std::sync::{Arc, Mutex, OnceLock};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::models::{ChangeEvent, ClientMessage, ServerMessage};
use crate::viewer::replica::{Marker, PlayerInfo, Replica};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One viewer's connection to a presence room: a background read loop that
/// applies the event stream to a local [`Replica`], plus non-blocking
/// accessors the rendering side polls on its own cadence.
pub struct ViewerSession {
    replica: Arc<Mutex<Replica>>,
    assigned_id: Arc<OnceLock<String>>,
    writer: Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>,
    read_task: JoinHandle<()>,
}

impl ViewerSession {
    /// Connect to a room, e.g. `ws://localhost:3000/ws/default` or the same
    /// URL with `?role=viewer` for a watch-only session.
    pub async fn connect(url: &str) -> Result<Self, ViewerError> {
        let (stream, _) = connect_async(url).await.map_err(ViewerError::Connect)?;
        info!("Viewer session connected to {}", url);

        let (writer, reader) = stream.split();
        let replica = Arc::new(Mutex::new(Replica::new()));
        let assigned_id = Arc::new(OnceLock::new());

        let read_task = tokio::spawn(read_loop(reader, replica.clone(), assigned_id.clone()));

        Ok(Self {
            replica,
            assigned_id,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            read_task,
        })
    }

    /// Materialize the current markers for one rendering tick. Returns
    /// immediately from in-memory state; never blocks on the network.
    pub fn sample(&self) -> Vec<Marker> {
        match self.replica.lock() {
            Ok(replica) => replica.sample(),
            Err(_) => Vec::new(),
        }
    }

    /// Current participants for display.
    pub fn player_list(&self) -> Vec<PlayerInfo> {
        match self.replica.lock() {
            Ok(replica) => replica.player_list(),
            Err(_) => Vec::new(),
        }
    }

    pub fn marker_count(&self) -> usize {
        match self.replica.lock() {
            Ok(replica) => replica.len(),
            Err(_) => 0,
        }
    }

    /// The id the coordinator assigned this connection, once the welcome
    /// message has arrived. Always `None` for watch-only sessions.
    pub fn assigned_id(&self) -> Option<String> {
        self.assigned_id.get().cloned()
    }

    /// Send a keep-alive ping.
    pub async fn ping(&self) -> Result<(), ViewerError> {
        let text = serde_json::to_string(&ClientMessage::Ping).map_err(ViewerError::Encode)?;
        self.writer
            .lock()
            .await
            .send(Message::text(text))
            .await
            .map_err(ViewerError::Connect)
    }

    /// Stop the session. No event is applied to the replica after this
    /// returns.
    pub fn close(&self) {
        self.read_task.abort();
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

/// Apply incoming frames one at a time, in arrival order. A malformed frame
/// is dropped and the stream continues; a transport error ends the session.
async fn read_loop(
    mut reader: SplitStream<WsStream>,
    replica: Arc<Mutex<Replica>>,
    assigned_id: Arc<OnceLock<String>>,
) {
    while let Some(frame) = reader.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Viewer transport error: {}", e);
                break;
            }
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        // Change events are the common case; everything else the server
        // sends (welcome, pong) is session bookkeeping.
        match ChangeEvent::decode(text.as_str()) {
            Ok(event) => apply(&replica, event),
            Err(_) => match serde_json::from_str::<ServerMessage>(text.as_str()) {
                Ok(ServerMessage::Welcome(welcome)) => {
                    let _ = assigned_id.set(welcome.id);
                }
                Ok(ServerMessage::Pong(_)) => {}
                Ok(_) => {}
                Err(e) => {
                    debug!("Discarding malformed frame: {}", e);
                }
            },
        }
    }
    debug!("Viewer read loop finished");
}

fn apply(replica: &Arc<Mutex<Replica>>, event: ChangeEvent) {
    if let Ok(mut replica) = replica.lock() {
        replica.apply(event);
    }
}

#[derive(Debug)]
pub enum ViewerError {
    Connect(tokio_tungstenite::tungstenite::Error),
    Encode(serde_json::Error),
}

impl std::fmt::Display for ViewerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewerError::Connect(e) => write!(f, "Viewer connection error: {}", e),
            ViewerError::Encode(e) => write!(f, "Failed to encode client message: {}", e),
        }
    }
}

impl std::error::Error for ViewerError {}
