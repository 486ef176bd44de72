use std::net::IpAddr;
use std::time::Duration;

use moka::future::Cache;
use serde::Deserialize;
use tracing::{debug, info};

/// A resolved client location, as returned by the external geolocation
/// service.
#[derive(Debug, Clone)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// ip-api style response body. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct GeoApiResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
    city: Option<String>,
    country: Option<String>,
}

/// Client for the external geolocation service, with a TTL cache per client
/// address in front of it. Lookups are best-effort; every failure mode maps
/// to a `GeoError` the caller degrades on.
#[derive(Debug)]
pub struct GeoClient {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<IpAddr, GeoLocation>,
}

impl GeoClient {
    pub fn new(base_url: String, cache_ttl_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build reqwest client");

        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(Duration::from_secs(cache_ttl_secs))
            .build();

        info!("Geolocation client initialized for {}", base_url);
        Self {
            client,
            base_url,
            cache,
        }
    }

    /// Resolve a client address to a location, consulting the cache first.
    pub async fn lookup(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        if !is_routable(ip) {
            return Err(GeoError::NonRoutable(ip));
        }

        if let Some(location) = self.cache.get(&ip).await {
            return Ok(location);
        }

        debug!("Geolocation cache miss for {}. Querying service.", ip);
        let location = self.fetch(ip).await?;
        self.cache.insert(ip, location.clone()).await;
        Ok(location)
    }

    async fn fetch(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);
        let response: GeoApiResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status != "success" {
            return Err(GeoError::LookupFailed(ip));
        }
        let (Some(lat), Some(lon)) = (response.lat, response.lon) else {
            return Err(GeoError::LookupFailed(ip));
        };

        Ok(GeoLocation {
            lat,
            lng: lon,
            city: response.city,
            country: response.country,
        })
    }
}

#[derive(Debug)]
pub enum GeoError {
    /// Loopback/private addresses carry no usable location.
    NonRoutable(IpAddr),
    /// The service answered but could not place the address.
    LookupFailed(IpAddr),
    Http(reqwest::Error),
}

impl std::fmt::Display for GeoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoError::NonRoutable(ip) => write!(f, "Address {} is not routable", ip),
            GeoError::LookupFailed(ip) => write!(f, "Geolocation service could not place {}", ip),
            GeoError::Http(e) => write!(f, "Geolocation request failed: {}", e),
        }
    }
}

impl std::error::Error for GeoError {}

impl From<reqwest::Error> for GeoError {
    fn from(e: reqwest::Error) -> Self {
        GeoError::Http(e)
    }
}

fn is_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !v4.is_loopback() && !v4.is_private() && !v4.is_link_local() && !v4.is_unspecified()
        }
        IpAddr::V6(v6) => !v6.is_loopback() && !v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn private_addresses_are_rejected_without_a_request() {
        // Unroutable base URL: reaching the network here would hang or fail
        // differently than the NonRoutable error we expect.
        let client = GeoClient::new("http://127.0.0.1:1/json".to_string(), 60);

        let err = client.lookup("127.0.0.1".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, GeoError::NonRoutable(_)));

        let err = client.lookup("10.1.2.3".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, GeoError::NonRoutable(_)));
    }

    #[test]
    fn routability() {
        assert!(is_routable("93.184.216.34".parse().unwrap()));
        assert!(!is_routable("192.168.0.10".parse().unwrap()));
        assert!(!is_routable("::1".parse().unwrap()));
    }
}
