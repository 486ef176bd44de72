pub mod clients;
pub mod config;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod routes;
pub mod viewer;
pub mod websocket;

use crate::clients::geo_client::GeoClient;
use crate::config::Config;
use crate::registry::PresenceRegistry;

/// Shared state handed to every handler.
pub struct AppState {
    pub registry: PresenceRegistry,
    pub geo: Option<GeoClient>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let geo = config
            .geo_api_url
            .as_ref()
            .map(|url| GeoClient::new(url.clone(), config.geo_cache_ttl_secs));
        Self {
            registry: PresenceRegistry::new(config.replay_on_attach),
            geo,
            config,
        }
    }
}
