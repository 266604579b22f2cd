use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use questpal_core::config::HuntConfig;
use questpal_core::domain::geo::LatLon;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GeocodeError {
    #[error("no place matches `{0}`")]
    NotFound(String),
    #[error("geocoding timed out after {0:?}")]
    Timeout(Duration),
    #[error("geocoding request failed: {0}")]
    Http(String),
}

/// Resolves free-text place descriptions to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<LatLon, GeocodeError>;
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim search, bounded by a hard timeout.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl NominatimGeocoder {
    pub fn new(config: &HuntConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.geocoder_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.geocode_timeout_secs),
        }
    }

    async fn search(&self, query: &str) -> Result<LatLon, GeocodeError> {
        let places: Vec<NominatimPlace> = self
            .client
            .get(format!("{}/search", self.base_url))
            .header(reqwest::header::USER_AGENT, concat!("questpal/", env!("CARGO_PKG_VERSION")))
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| GeocodeError::Http(error.to_string()))?
            .json()
            .await
            .map_err(|error| GeocodeError::Http(error.to_string()))?;

        let place = places.into_iter().next().ok_or_else(|| GeocodeError::NotFound(query.to_string()))?;
        parse_place(&place).ok_or_else(|| GeocodeError::Http(format!("malformed coordinates for `{query}`")))
    }
}

fn parse_place(place: &NominatimPlace) -> Option<LatLon> {
    let point = LatLon::new(place.lat.trim().parse().ok()?, place.lon.trim().parse().ok()?);
    point.is_valid().then_some(point)
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<LatLon, GeocodeError> {
        match tokio::time::timeout(self.timeout, self.search(query)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(event_name = "geocode.timeout", timeout_secs = self.timeout.as_secs(), "geocoding timed out");
                Err(GeocodeError::Timeout(self.timeout))
            }
        }
    }
}

/// In-memory gazetteer keyed by case-insensitive query text.
#[derive(Debug, Default)]
pub struct StaticGeocoder {
    places: HashMap<String, LatLon>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, query: &str, point: LatLon) -> Self {
        self.places.insert(query.trim().to_lowercase(), point);
        self
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, query: &str) -> Result<LatLon, GeocodeError> {
        self.places
            .get(&query.trim().to_lowercase())
            .copied()
            .ok_or_else(|| GeocodeError::NotFound(query.to_string()))
    }
}
