use serde::{Deserialize, Serialize};

/// Response for diagnostics information
#[derive(Serialize, Deserialize)]
pub struct DiagnosticsResponse {
    pub n_rooms: u32,
    pub n_markers: u32,
    pub n_viewers: u32,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
