//! Open-data fallback provider (OSM Nominatim). Last in the default
//! chain. Nominatim returns coordinates as strings and requires a real
//! user agent, which the HTTP adapter supplies.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::HttpFetch;
use super::{GeocodeError, GeocodingProvider};
use crate::models::Coordinates;

const BASE_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Nominatim search client
pub struct NominatimGeocoder {
    fetch: Arc<dyn HttpFetch>,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    /// Create a provider
    #[must_use]
    pub fn new(fetch: Arc<dyn HttpFetch>) -> Self {
        Self { fetch }
    }

    fn request_url(address: &str) -> String {
        format!(
            "{}?q={}&format=json&limit=1",
            BASE_URL,
            urlencoding::encode(address)
        )
    }
}

#[async_trait]
impl GeocodingProvider for NominatimGeocoder {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        let response = self.fetch.get(&Self::request_url(address)).await?;
        if !response.is_success() {
            return Err(GeocodeError::Status(response.status));
        }

        let places: Vec<Place> = serde_json::from_str(&response.body)
            .map_err(|e| GeocodeError::Parse(format!("Invalid search response: {e}")))?;

        let place = places.into_iter().next().ok_or(GeocodeError::NoResults)?;

        let latitude: f64 = place
            .lat
            .parse()
            .map_err(|_| GeocodeError::Parse(format!("Invalid latitude '{}'", place.lat)))?;
        let longitude: f64 = place
            .lon
            .parse()
            .map_err(|_| GeocodeError::Parse(format!("Invalid longitude '{}'", place.lon)))?;

        Ok(Coordinates::new(latitude, longitude))
    }
}

#[cfg(test)]
mod tests {
    use super::super::http::HttpResponse;
    use super::*;

    struct CannedFetch {
        response: HttpResponse,
    }

    #[async_trait]
    impl HttpFetch for CannedFetch {
        async fn get(&self, _url: &str) -> Result<HttpResponse, GeocodeError> {
            Ok(self.response.clone())
        }
    }

    fn geocoder_with_body(body: &str) -> NominatimGeocoder {
        NominatimGeocoder::new(Arc::new(CannedFetch {
            response: HttpResponse {
                status: 200,
                body: body.to_string(),
            },
        }))
    }

    #[tokio::test]
    async fn test_parses_string_coordinates() {
        let body = r#"[{"lat": "47.3768866", "lon": "8.541694"}]"#;
        let coordinates = geocoder_with_body(body).geocode("Zurich").await.unwrap();
        assert_eq!(coordinates, Coordinates::new(47.3768866, 8.541694));
    }

    #[tokio::test]
    async fn test_empty_array_is_no_results() {
        let error = geocoder_with_body("[]").geocode("xyzzy").await.unwrap_err();
        assert_eq!(error, GeocodeError::NoResults);
    }

    #[tokio::test]
    async fn test_unparseable_coordinate() {
        let body = r#"[{"lat": "not-a-number", "lon": "8.5"}]"#;
        let error = geocoder_with_body(body).geocode("Zurich").await.unwrap_err();
        assert!(matches!(error, GeocodeError::Parse(_)));
    }
}
