use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ChangeEvent, Position, ServerMessage};

pub type ViewerId = Uuid;

/// One room's canonical presence state: the id → Position map plus the set
/// of attached broadcast recipients. All mutation happens under the single
/// state lock; the lock covers the map update and the enqueue into each
/// viewer's channel, never the socket I/O itself (each viewer's forwarding
/// task drains its own channel).
pub struct Room {
    name: String,
    replay_on_attach: bool,
    state: Mutex<RoomState>,
}

struct RoomState {
    markers: HashMap<String, Position>,
    viewers: HashMap<ViewerId, UnboundedSender<ServerMessage>>,
    // Set when the registry drops the room; late attaches must go through
    // the registry again instead of landing in an orphaned room.
    retired: bool,
}

impl Room {
    pub(crate) fn new(name: String, replay_on_attach: bool) -> Self {
        Self {
            name,
            replay_on_attach,
            state: Mutex::new(RoomState {
                markers: HashMap::new(),
                viewers: HashMap::new(),
                retired: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a new broadcast recipient. Returns `None` if the room was
    /// retired in the meantime. When replay is enabled the current marker
    /// set is enqueued as synthetic add events under the same lock
    /// acquisition, so replayed adds order correctly against whatever the
    /// room broadcasts next.
    pub async fn attach_viewer(&self) -> Option<(ViewerId, UnboundedReceiver<ServerMessage>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        if state.retired {
            return None;
        }
        if self.replay_on_attach {
            for position in state.markers.values() {
                let _ = tx.send(ChangeEvent::add(position.clone()).into());
            }
        }
        let viewer_id = Uuid::new_v4();
        state.viewers.insert(viewer_id, tx);
        debug!(
            "Viewer {} attached to room '{}' ({} attached)",
            viewer_id,
            self.name,
            state.viewers.len()
        );
        Some((viewer_id, rx))
    }

    /// Unregister a broadcast recipient. Safe to call more than once and
    /// safe to call while a broadcast is in flight.
    pub async fn detach_viewer(&self, viewer_id: ViewerId) {
        let mut state = self.state.lock().await;
        if state.viewers.remove(&viewer_id).is_some() {
            debug!(
                "Viewer {} detached from room '{}' ({} attached)",
                viewer_id,
                self.name,
                state.viewers.len()
            );
        }
    }

    /// Record a participant's presence and broadcast the add to every
    /// attached viewer. A second connect for the same id replaces the
    /// existing entry.
    pub async fn participant_connected(&self, position: Position) {
        let mut state = self.state.lock().await;
        let id = position.id.clone();
        state.markers.insert(id.clone(), position.clone());
        info!(
            "Participant {} joined room '{}' ({} present)",
            id,
            self.name,
            state.markers.len()
        );
        self.broadcast(&mut state, ChangeEvent::add(position));
    }

    /// Remove a participant and broadcast the removal. Disconnects can race
    /// with registry cleanup, so an absent id is a no-op rather than an
    /// error, and nothing is broadcast for it.
    pub async fn participant_disconnected(&self, id: &str) {
        let mut state = self.state.lock().await;
        if state.markers.remove(id).is_none() {
            debug!(
                "Participant {} already gone from room '{}'",
                id, self.name
            );
            return;
        }
        info!(
            "Participant {} left room '{}' ({} present)",
            id,
            self.name,
            state.markers.len()
        );
        self.broadcast(&mut state, ChangeEvent::remove(id.to_string()));
    }

    /// Enqueue an event to every attached viewer. A closed channel means
    /// the viewer's connection is gone; it is dropped from the recipient
    /// set in place and never blocks or fails delivery to the others.
    fn broadcast(&self, state: &mut RoomState, event: ChangeEvent) {
        let msg: ServerMessage = event.into();
        let mut unreachable: Vec<ViewerId> = Vec::new();
        for (viewer_id, tx) in state.viewers.iter() {
            if tx.send(msg.clone()).is_err() {
                unreachable.push(*viewer_id);
            }
        }
        for viewer_id in unreachable {
            warn!(
                "Dropping unreachable viewer {} from room '{}'",
                viewer_id, self.name
            );
            state.viewers.remove(&viewer_id);
        }
    }

    pub async fn marker(&self, id: &str) -> Option<Position> {
        self.state.lock().await.markers.get(id).cloned()
    }

    /// (marker count, viewer count)
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.markers.len(), state.viewers.len())
    }

    /// Mark the room retired if nothing references it anymore. Returns
    /// whether it was retired.
    pub(crate) async fn retire_if_empty(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.markers.is_empty() && state.viewers.is_empty() {
            state.retired = true;
            true
        } else {
            false
        }
    }
}
