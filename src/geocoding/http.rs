//! HTTP boundary for geocoding providers.
//!
//! [`HttpFetch`] is the only place network I/O happens in this crate;
//! providers receive it injected once, which keeps every provider call
//! mockable in tests.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::GeocodeError;
use crate::config::GeocodingConfig;

/// Raw HTTP response as providers see it
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal fetch abstraction injected into every provider
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Perform a GET request and return status plus body
    async fn get(&self, url: &str) -> Result<HttpResponse, GeocodeError>;
}

/// Production fetcher backed by a shared reqwest client
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Build a fetcher with the configured timeout and user agent
    pub fn new(config: &GeocodingConfig) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GeocodeError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<HttpResponse, GeocodeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GeocodeError::Network(format!("Request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::Network(format!("Failed to read response body: {e}")))?;

        Ok(HttpResponse { status, body })
    }
}
