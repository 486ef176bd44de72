use serde::{Deserialize, Serialize};

/// API response for health check
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}
