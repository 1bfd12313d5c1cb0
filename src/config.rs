//! Configuration management for the `EntryMap` engine
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::EntryMapError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure for the `EntryMap` engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntryMapConfig {
    /// Geocoding provider configuration
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    /// Meta-store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Geocoding provider chain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Business provider API key; the business provider is only wired
    /// into the chain when a key is configured
    pub google_api_key: Option<String>,
    /// Request timeout in seconds, applied by the HTTP adapter
    #[serde(default = "default_geocoding_timeout")]
    pub timeout_seconds: u64,
    /// User agent sent with every provider request (the open-data
    /// provider rejects requests without one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Optional region/language bias passed to providers that accept one
    pub region: Option<String>,
}

/// Durable meta-store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store directory location
    #[serde(default = "default_store_location")]
    pub location: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_geocoding_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("EntryMap/{}", crate::VERSION)
}

fn default_store_location() -> String {
    "~/.cache/entrymap".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            timeout_seconds: default_geocoding_timeout(),
            user_agent: default_user_agent(),
            region: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: default_store_location(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl EntryMapConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| PathBuf::from("config/entrymap.toml"));
        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment overrides with ENTRYMAP_ prefix, e.g.
        // ENTRYMAP_GEOCODING__GOOGLE_API_KEY
        builder = builder.add_source(
            Environment::with_prefix("ENTRYMAP")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let config: EntryMapConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        if let Some(api_key) = &self.geocoding.google_api_key {
            if api_key.is_empty() {
                return Err(EntryMapError::config(
                    "Geocoding API key cannot be empty if provided. Either remove it or provide a valid key.",
                )
                .into());
            }
        }

        if self.geocoding.timeout_seconds == 0 || self.geocoding.timeout_seconds > 300 {
            return Err(
                EntryMapError::config("Geocoding timeout must be between 1 and 300 seconds").into(),
            );
        }

        if self.geocoding.user_agent.is_empty() {
            return Err(EntryMapError::config("Geocoding user agent cannot be empty").into());
        }

        if self.store.location.is_empty() {
            return Err(EntryMapError::config("Store location cannot be empty").into());
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(EntryMapError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ))
            .into());
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(EntryMapError::config(format!(
                "Invalid log format '{}'. Must be 'pretty' or 'json'",
                self.logging.format
            ))
            .into());
        }

        Ok(())
    }
}

/// Initialize the global tracing subscriber from the logging section.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
}
