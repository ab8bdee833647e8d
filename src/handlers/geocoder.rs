use std::time::Duration;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use crate::models::error::GeocodeError;
use crate::models::position::Coordinate;

/// Resolves an approximate position from a place name.
#[async_trait]
pub trait FallbackGeocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<Coordinate, GeocodeError>;
}

/// Client for an OpenCage-style forward geocoding endpoint.
pub struct HttpGeocoder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    lat: f64,
    lng: f64,
}

impl HttpGeocoder {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url, api_key })
    }
}

#[async_trait]
impl FallbackGeocoder for HttpGeocoder {
    async fn geocode(&self, query: &str) -> Result<Coordinate, GeocodeError> {
        let api_key = self.api_key.as_deref().ok_or(GeocodeError::Unavailable)?;

        debug!("Geocoding {:?}", query);
        let response: GeocodeResponse = self.client
            .get(&self.url)
            .query(&[("q", query), ("key", api_key), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        first_valid(response)
            .ok_or_else(|| GeocodeError::NoResult(query.to_string()))
    }
}

fn first_valid(response: GeocodeResponse) -> Option<Coordinate> {
    let geometry = &response.results.first()?.geometry;
    match Coordinate::new(geometry.lat, geometry.lng) {
        Ok(coordinate) => Some(coordinate),
        Err(e) => {
            warn!("Geocoder returned {}", e);
            None
        }
    }
}
