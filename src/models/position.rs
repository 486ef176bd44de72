use serde::{Deserialize, Serialize};

/// A participant's resolved location, as tracked by the coordinator and
/// broadcast to every viewer. `city` and `country` are display hints; when
/// absent they stay absent on the wire and consumers fall back to "Unknown".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Position {
    /// Position for a participant whose location could not be resolved.
    pub fn unknown(id: String) -> Self {
        Self {
            id,
            lat: 0.0,
            lng: 0.0,
            city: None,
            country: None,
        }
    }
}
