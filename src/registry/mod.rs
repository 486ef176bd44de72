pub mod room;

pub use room::{Room, ViewerId};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::ServerMessage;

/// Aggregate counts across every active room, for diagnostics.
pub struct RegistryStats {
    pub n_rooms: u32,
    pub n_markers: u32,
    pub n_viewers: u32,
}

/// Coordinator-side authority over every active room. Rooms are created on
/// first touch and retired once their last marker and viewer are gone.
pub struct PresenceRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    replay_on_attach: bool,
}

impl PresenceRegistry {
    pub fn new(replay_on_attach: bool) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            replay_on_attach,
        }
    }

    /// Get or create the room with the given name.
    pub async fn room(&self, name: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(name) {
            return room.clone();
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(name.to_string())
            .or_insert_with(|| {
                info!("Creating room '{}'", name);
                Arc::new(Room::new(name.to_string(), self.replay_on_attach))
            })
            .clone()
    }

    /// Register a broadcast recipient in the named room. Loops because a
    /// looked-up room can be retired before the attach lands; the next
    /// lookup then creates a fresh one.
    pub async fn attach_viewer(
        &self,
        name: &str,
    ) -> (Arc<Room>, ViewerId, UnboundedReceiver<ServerMessage>) {
        loop {
            let room = self.room(name).await;
            if let Some((viewer_id, rx)) = room.attach_viewer().await {
                return (room, viewer_id, rx);
            }
        }
    }

    /// Drop the named room if it holds no markers and no viewers.
    pub async fn retire_if_empty(&self, name: &str) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(name) else {
            return;
        };
        if room.retire_if_empty().await {
            debug!("Retiring empty room '{}'", name);
            rooms.remove(name);
        }
    }

    pub async fn stats(&self) -> RegistryStats {
        let rooms = self.rooms.read().await;
        let mut stats = RegistryStats {
            n_rooms: rooms.len() as u32,
            n_markers: 0,
            n_viewers: 0,
        };
        for room in rooms.values() {
            let (markers, viewers) = room.counts().await;
            stats.n_markers += markers as u32;
            stats.n_viewers += viewers as u32;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;
    use tokio::sync::mpsc::error::TryRecvError;

    fn position(id: &str, lat: f64, lng: f64) -> Position {
        Position {
            id: id.to_string(),
            lat,
            lng,
            city: None,
            country: None,
        }
    }

    #[tokio::test]
    async fn connect_then_disconnect_reaches_an_attached_viewer() {
        let registry = PresenceRegistry::new(false);
        let (room, _viewer_id, mut rx) = registry.attach_viewer("default").await;

        room.participant_connected(position("p1", 50.85, 4.35)).await;
        assert_eq!(room.counts().await.0, 1);

        let msg = rx.recv().await.unwrap();
        match msg {
            ServerMessage::AddMarker(add) => {
                assert_eq!(add.position.id, "p1");
                assert_eq!(add.position.lat, 50.85);
            }
            other => panic!("expected add-marker, got {:?}", other),
        }

        room.participant_disconnected("p1").await;
        assert_eq!(room.counts().await.0, 0);

        let msg = rx.recv().await.unwrap();
        match msg {
            ServerMessage::RemoveMarker(remove) => assert_eq!(remove.id, "p1"),
            other => panic!("expected remove-marker, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn broadcast_survives_a_dead_recipient() {
        let registry = PresenceRegistry::new(false);
        let room = registry.room("default").await;

        let (_, mut healthy_rx) = room.attach_viewer().await.unwrap();
        let (_, dead_rx) = room.attach_viewer().await.unwrap();
        drop(dead_rx);

        room.participant_connected(position("p1", 1.0, 2.0)).await;

        // The healthy viewer still got the event.
        assert!(matches!(
            healthy_rx.recv().await,
            Some(ServerMessage::AddMarker(_))
        ));
        // The unreachable viewer was dropped during the broadcast.
        assert_eq!(room.counts().await.1, 1);
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let registry = PresenceRegistry::new(false);
        let room = registry.room("default").await;
        let (viewer_id, _rx) = room.attach_viewer().await.unwrap();

        room.detach_viewer(viewer_id).await;
        room.detach_viewer(viewer_id).await;
        assert_eq!(room.counts().await.1, 0);
    }

    #[tokio::test]
    async fn disconnect_of_unknown_participant_broadcasts_nothing() {
        let registry = PresenceRegistry::new(false);
        let (room, _viewer_id, mut rx) = registry.attach_viewer("default").await;

        room.participant_disconnected("ghost").await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn late_viewer_starts_empty_without_replay() {
        let registry = PresenceRegistry::new(false);
        let room = registry.room("default").await;
        room.participant_connected(position("p1", 1.0, 2.0)).await;

        let (_, _viewer_id, mut rx) = registry.attach_viewer("default").await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn late_viewer_gets_replay_when_enabled() {
        let registry = PresenceRegistry::new(true);
        let room = registry.room("default").await;
        room.participant_connected(position("p1", 1.0, 2.0)).await;
        room.participant_connected(position("p2", 3.0, 4.0)).await;

        let (_, _viewer_id, mut rx) = registry.attach_viewer("default").await;
        let mut replayed = Vec::new();
        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                ServerMessage::AddMarker(add) => replayed.push(add.position.id),
                other => panic!("expected add-marker, got {:?}", other),
            }
        }
        replayed.sort();
        assert_eq!(replayed, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn empty_rooms_are_retired_and_recreated() {
        let registry = PresenceRegistry::new(false);
        let (room, viewer_id, _rx) = registry.attach_viewer("default").await;

        // Occupied rooms stay.
        registry.retire_if_empty("default").await;
        assert_eq!(registry.stats().await.n_rooms, 1);

        room.detach_viewer(viewer_id).await;
        registry.retire_if_empty("default").await;
        assert_eq!(registry.stats().await.n_rooms, 0);

        // A retired room refuses attaches; the registry hands out a new one.
        assert!(room.attach_viewer().await.is_none());
        let (fresh, _, _rx2) = registry.attach_viewer("default").await;
        assert!(fresh.attach_viewer().await.is_some());
    }

    #[tokio::test]
    async fn duplicate_connect_keeps_one_entry_per_id() {
        let registry = PresenceRegistry::new(false);
        let room = registry.room("default").await;
        room.participant_connected(position("p1", 1.0, 2.0)).await;
        room.participant_connected(position("p1", 5.0, 6.0)).await;
        assert_eq!(room.counts().await.0, 1);

        let current = room.marker("p1").await.expect("p1 should be present");
        assert_eq!(current.lat, 5.0);
    }
}
