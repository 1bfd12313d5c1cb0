//! Key-based business geocoding provider (Google Maps Geocoding API).
//!
//! First in the default chain when an API key is configured. A provider
//! error payload (`error_message` in the body) counts as a failure even
//! when the HTTP status is 200.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::HttpFetch;
use super::{GeocodeError, GeocodingProvider};
use crate::models::Coordinates;

const BASE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Google Maps Geocoding API client
pub struct GoogleGeocoder {
    fetch: Arc<dyn HttpFetch>,
    api_key: String,
    region: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl GoogleGeocoder {
    /// Create a provider with the given key and optional region bias
    #[must_use]
    pub fn new(fetch: Arc<dyn HttpFetch>, api_key: String, region: Option<String>) -> Self {
        Self {
            fetch,
            api_key,
            region,
            base_url: BASE_URL.to_string(),
        }
    }

    fn request_url(&self, address: &str) -> String {
        let mut url = format!(
            "{}?address={}&key={}",
            self.base_url,
            urlencoding::encode(address),
            self.api_key
        );
        if let Some(region) = &self.region {
            url.push_str(&format!("&region={}", urlencoding::encode(region)));
        }
        url
    }
}

#[async_trait]
impl GeocodingProvider for GoogleGeocoder {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        let response = self.fetch.get(&self.request_url(address)).await?;
        if !response.is_success() {
            return Err(GeocodeError::Status(response.status));
        }

        let parsed: GeocodeResponse = serde_json::from_str(&response.body)
            .map_err(|e| GeocodeError::Parse(format!("Invalid geocode response: {e}")))?;

        if let Some(message) = parsed.error_message {
            return Err(GeocodeError::Provider(message));
        }
        if parsed.status == "ZERO_RESULTS" || parsed.results.is_empty() {
            return Err(GeocodeError::NoResults);
        }
        if parsed.status != "OK" {
            return Err(GeocodeError::Provider(parsed.status));
        }

        let location = &parsed.results[0].geometry.location;
        Ok(Coordinates::new(location.lat, location.lng))
    }
}
