use std::collections::HashMap;

use crate::models::ChangeEvent;

/// Render size every marker gets on the globe.
pub const MARKER_SIZE: f32 = 0.09;

/// What the renderer needs per marker: a (lat, lng) location and a size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub location: (f64, f64),
    pub size: f32,
}

/// Display entry for the online-participants panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: String,
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone)]
struct Entry {
    marker: Marker,
    city: Option<String>,
    country: Option<String>,
}

/// Viewer-local projection of one room's presence set, rebuilt from empty
/// at connection start and mutated only by [`Replica::apply`]. The rendering
/// side reads it through [`Replica::sample`] and never writes.
#[derive(Debug, Default)]
pub struct Replica {
    entries: HashMap<String, Entry>,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one change event. Adds overwrite any existing entry for the
    /// same id and removes of an absent id do nothing, so duplicated or
    /// reordered delivery converges instead of erroring.
    pub fn apply(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::AddMarker(add) => {
                let position = add.position;
                self.entries.insert(
                    position.id,
                    Entry {
                        marker: Marker {
                            location: (position.lat, position.lng),
                            size: MARKER_SIZE,
                        },
                        city: position.city,
                        country: position.country,
                    },
                );
            }
            ChangeEvent::RemoveMarker(remove) => {
                self.entries.remove(&remove.id);
            }
        }
    }

    /// Materialize the current marker values for one rendering tick.
    /// Iteration order is unspecified and may differ between calls.
    pub fn sample(&self) -> Vec<Marker> {
        self.entries.values().map(|entry| entry.marker).collect()
    }

    /// Current participants for display, with "Unknown" standing in for
    /// absent city/country.
    pub fn player_list(&self) -> Vec<PlayerInfo> {
        self.entries
            .iter()
            .map(|(id, entry)| PlayerInfo {
                id: id.clone(),
                city: entry.city.clone().unwrap_or_else(|| "Unknown".to_string()),
                country: entry
                    .country
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
            })
            .collect()
    }

    pub fn marker(&self, id: &str) -> Option<Marker> {
        self.entries.get(id).map(|entry| entry.marker)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;

    fn add(id: &str, lat: f64, lng: f64) -> ChangeEvent {
        ChangeEvent::add(Position {
            id: id.to_string(),
            lat,
            lng,
            city: None,
            country: None,
        })
    }

    fn remove(id: &str) -> ChangeEvent {
        ChangeEvent::remove(id.to_string())
    }

    #[test]
    fn replica_tracks_adds_minus_removes() {
        let mut replica = Replica::new();
        for event in [
            add("a", 1.0, 1.0),
            add("b", 2.0, 2.0),
            remove("a"),
            add("c", 3.0, 3.0),
        ] {
            replica.apply(event);
        }
        assert_eq!(replica.len(), 2);
        assert!(!replica.contains("a"));
        assert!(replica.contains("b"));
        assert!(replica.contains("c"));
    }

    #[test]
    fn duplicate_add_overwrites() {
        let mut replica = Replica::new();
        replica.apply(add("a", 1.0, 1.0));
        replica.apply(add("a", 9.0, 8.0));
        assert_eq!(replica.len(), 1);
        assert_eq!(replica.marker("a").unwrap().location, (9.0, 8.0));
    }

    #[test]
    fn stray_remove_is_a_silent_no_op() {
        let mut replica = Replica::new();
        replica.apply(remove("ghost"));
        assert!(replica.is_empty());
    }

    #[test]
    fn repeated_remove_is_idempotent() {
        let mut replica = Replica::new();
        replica.apply(add("a", 1.0, 1.0));
        replica.apply(remove("a"));
        let after_one = replica.len();
        replica.apply(remove("a"));
        assert_eq!(replica.len(), after_one);
        assert!(replica.is_empty());
    }

    #[test]
    fn add_remove_add_leaves_present() {
        let mut replica = Replica::new();
        replica.apply(add("a", 1.0, 1.0));
        replica.apply(remove("a"));
        replica.apply(add("a", 2.0, 2.0));
        assert!(replica.contains("a"));
        assert_eq!(replica.marker("a").unwrap().location, (2.0, 2.0));
    }

    #[test]
    fn sample_materializes_current_values() {
        let mut replica = Replica::new();
        replica.apply(add("a", 1.0, 1.0));
        replica.apply(add("b", 2.0, 2.0));

        let snapshot = replica.sample();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|m| m.size == MARKER_SIZE));

        // The snapshot is detached from later mutation.
        replica.apply(remove("a"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(replica.sample().len(), 1);
    }

    #[test]
    fn player_list_falls_back_to_unknown() {
        let mut replica = Replica::new();
        replica.apply(ChangeEvent::add(Position {
            id: "a".to_string(),
            lat: 1.0,
            lng: 2.0,
            city: Some("Brussels".to_string()),
            country: None,
        }));

        let players = replica.player_list();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].city, "Brussels");
        assert_eq!(players[0].country, "Unknown");
    }
}
