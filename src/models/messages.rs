use serde::{Deserialize, Serialize};

use crate::models::error::MessageError;
use crate::models::position::Position;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddMarkerMessage {
    pub position: Position,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMarkerMessage {
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMessage {
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

/// A change to the presence set. This is the whole replica-maintenance
/// vocabulary: a marker either appeared or it went away.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    #[serde(rename = "add-marker")]
    AddMarker(AddMarkerMessage),
    #[serde(rename = "remove-marker")]
    RemoveMarker(RemoveMarkerMessage),
}

impl ChangeEvent {
    pub fn add(position: Position) -> Self {
        ChangeEvent::AddMarker(AddMarkerMessage { position })
    }

    pub fn remove(id: String) -> Self {
        ChangeEvent::RemoveMarker(RemoveMarkerMessage { id })
    }

    /// Decode one wire frame. An unrecognized tag or a missing required
    /// field is a malformed message; the caller drops the frame and keeps
    /// reading the stream.
    pub fn decode(raw: &str) -> Result<Self, MessageError> {
        serde_json::from_str(raw).map_err(MessageError::Malformed)
    }
}

/// Everything the coordinator may send down a socket: change events, the
/// id confirmation for a freshly connected participant, and pong replies.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMessage),
    #[serde(rename = "add-marker")]
    AddMarker(AddMarkerMessage),
    #[serde(rename = "remove-marker")]
    RemoveMarker(RemoveMarkerMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

impl From<ChangeEvent> for ServerMessage {
    fn from(event: ChangeEvent) -> Self {
        match event {
            ChangeEvent::AddMarker(msg) => ServerMessage::AddMarker(msg),
            ChangeEvent::RemoveMarker(msg) => ServerMessage::RemoveMarker(msg),
        }
    }
}

/// Messages a client may send upstream. Viewers are otherwise read-only.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "ping")]
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_add_marker() {
        let raw = r#"{"type":"add-marker","position":{"id":"p1","lat":50.85,"lng":4.35,"city":"Brussels","country":"Belgium"}}"#;
        let event = ChangeEvent::decode(raw).unwrap();
        match event {
            ChangeEvent::AddMarker(msg) => {
                assert_eq!(msg.position.id, "p1");
                assert_eq!(msg.position.lat, 50.85);
                assert_eq!(msg.position.city.as_deref(), Some("Brussels"));
            }
            other => panic!("expected add-marker, got {:?}", other),
        }
    }

    #[test]
    fn decodes_remove_marker() {
        let raw = r#"{"type":"remove-marker","id":"p1"}"#;
        let event = ChangeEvent::decode(raw).unwrap();
        assert_eq!(event, ChangeEvent::remove("p1".to_string()));
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let raw = r#"{"type":"teleport-marker","id":"p1"}"#;
        assert!(ChangeEvent::decode(raw).is_err());
    }

    #[test]
    fn add_marker_missing_required_fields_is_malformed() {
        // No lat/lng
        let raw = r#"{"type":"add-marker","position":{"id":"p1"}}"#;
        assert!(ChangeEvent::decode(raw).is_err());
        // No id
        let raw = r#"{"type":"add-marker","position":{"lat":1.0,"lng":2.0}}"#;
        assert!(ChangeEvent::decode(raw).is_err());
    }

    #[test]
    fn omitted_optionals_decode_to_none_and_stay_off_the_wire() {
        let raw = r#"{"type":"add-marker","position":{"id":"p1","lat":1.5,"lng":-2.5}}"#;
        let event = ChangeEvent::decode(raw).unwrap();
        let ChangeEvent::AddMarker(msg) = &event else {
            panic!("expected add-marker");
        };
        assert_eq!(msg.position.city, None);
        assert_eq!(msg.position.country, None);

        let encoded = serde_json::to_string(&event).unwrap();
        assert!(!encoded.contains("city"));
        assert!(!encoded.contains("country"));
        assert_eq!(ChangeEvent::decode(&encoded).unwrap(), event);
    }

    #[test]
    fn unknown_extra_fields_are_ignored() {
        let raw = r#"{"type":"remove-marker","id":"p1","reason":"timeout","hops":3}"#;
        let event = ChangeEvent::decode(raw).unwrap();
        assert_eq!(event, ChangeEvent::remove("p1".to_string()));
    }

    #[test]
    fn welcome_is_not_a_change_event() {
        let raw = r#"{"type":"welcome","id":"p1"}"#;
        assert!(ChangeEvent::decode(raw).is_err());
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ServerMessage::Welcome(w) => assert_eq!(w.id, "p1"),
            other => panic!("expected welcome, got {:?}", other),
        }
    }
}
