//! Geocoding provider chain.
//!
//! Turns a free-text address into coordinates by trying registered
//! providers strictly in priority order: the key-based business provider
//! first when configured, then the free provider, then the open-data
//! fallback. The first success wins; when every provider fails the last
//! error is returned. There is no retry or backoff beyond the fallback
//! order itself.

pub mod google;
pub mod http;
pub mod nominatim;
pub mod open_meteo;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::GeocodingConfig;
use crate::models::Coordinates;

pub use google::GoogleGeocoder;
pub use http::{HttpFetch, HttpResponse, ReqwestFetcher};
pub use nominatim::NominatimGeocoder;
pub use open_meteo::OpenMeteoGeocoder;

/// Errors a provider call can produce
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No results found")]
    NoResults,

    #[error("Address is empty")]
    EmptyAddress,
}

impl GeocodeError {
    /// Short machine-readable code, used when caching a failure
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            GeocodeError::Network(_) => "network",
            GeocodeError::Status(_) => "status",
            GeocodeError::Provider(_) => "provider",
            GeocodeError::Parse(_) => "parse",
            GeocodeError::NoResults => "no_results",
            GeocodeError::EmptyAddress => "empty_address",
        }
    }

    /// Stringified form stored in the position cache
    #[must_use]
    pub fn cache_string(&self) -> String {
        format!("[{}] {self}", self.code())
    }
}

/// One geocoding backend
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Resolve a whitespace-normalized, non-empty address
    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError>;
}

/// Collapse an address to a single trimmed line: newlines become spaces
/// and runs of whitespace collapse to one space.
#[must_use]
pub fn normalize_address(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ordered provider chain
pub struct ProviderChain {
    providers: Vec<Box<dyn GeocodingProvider>>,
}

impl ProviderChain {
    /// Build a chain from an explicit provider list, highest priority
    /// first
    #[must_use]
    pub fn new(providers: Vec<Box<dyn GeocodingProvider>>) -> Self {
        Self { providers }
    }

    /// Wire the default chain from configuration. The business provider
    /// is included only when an API key is configured.
    #[must_use]
    pub fn from_config(config: &GeocodingConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        let mut providers: Vec<Box<dyn GeocodingProvider>> = Vec::new();

        if let Some(api_key) = &config.google_api_key {
            providers.push(Box::new(GoogleGeocoder::new(
                Arc::clone(&fetcher),
                api_key.clone(),
                config.region.clone(),
            )));
        }
        providers.push(Box::new(OpenMeteoGeocoder::new(
            Arc::clone(&fetcher),
            config.region.clone(),
        )));
        providers.push(Box::new(NominatimGeocoder::new(fetcher)));

        Self::new(providers)
    }

    /// Registered provider names, in priority order
    #[must_use]
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Resolve an address, trying providers in priority order.
    ///
    /// Returns the first success, or the last provider's error when all
    /// fail.
    pub async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        let address = normalize_address(address);
        if address.is_empty() {
            return Err(GeocodeError::EmptyAddress);
        }

        let mut last_error = GeocodeError::Provider("No geocoding providers configured".to_string());

        for provider in &self.providers {
            debug!("Trying geocoding provider {} for: {}", provider.name(), address);
            match provider.geocode(&address).await {
                Ok(coordinates) => {
                    info!(
                        "Provider {} resolved '{}' to {}",
                        provider.name(),
                        address,
                        coordinates.format_coordinates()
                    );
                    return Ok(coordinates);
                }
                Err(error) => {
                    warn!("Provider {} failed for '{}': {}", provider.name(), address, error);
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }
}
