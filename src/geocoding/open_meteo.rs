//! Free geocoding provider (`OpenMeteo` geocoding API, no API key
//! required). Second in the default chain.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::HttpFetch;
use super::{GeocodeError, GeocodingProvider};
use crate::models::Coordinates;

const BASE_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

/// `OpenMeteo` geocoding client
pub struct OpenMeteoGeocoder {
    fetch: Arc<dyn HttpFetch>,
    language: String,
}

/// Geocoding response from `OpenMeteo`
#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    latitude: f64,
    longitude: f64,
}

impl OpenMeteoGeocoder {
    /// Create a provider; the optional region hint becomes the result
    /// language
    #[must_use]
    pub fn new(fetch: Arc<dyn HttpFetch>, region: Option<String>) -> Self {
        Self {
            fetch,
            language: region.map_or_else(|| "en".to_string(), |r| r.to_lowercase()),
        }
    }

    fn request_url(&self, address: &str) -> String {
        format!(
            "{}?name={}&count=1&language={}&format=json",
            BASE_URL,
            urlencoding::encode(address),
            self.language
        )
    }
}

#[async_trait]
impl GeocodingProvider for OpenMeteoGeocoder {
    fn name(&self) -> &'static str {
        "open-meteo"
    }

    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        let response = self.fetch.get(&self.request_url(address)).await?;
        if !response.is_success() {
            return Err(GeocodeError::Status(response.status));
        }

        let parsed: GeocodingResponse = serde_json::from_str(&response.body)
            .map_err(|e| GeocodeError::Parse(format!("Invalid geocoding response: {e}")))?;

        let result = parsed
            .results
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or(GeocodeError::NoResults)?;

        Ok(Coordinates::new(result.latitude, result.longitude))
    }
}
