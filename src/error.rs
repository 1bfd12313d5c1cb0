//! Error types and handling for the `EntryMap` engine

use thiserror::Error;

/// Main error type for the `EntryMap` engine
#[derive(Error, Debug)]
pub enum EntryMapError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Record-store access errors
    #[error("Store error: {message}")]
    Store { message: String },

    /// Geocoding errors that escaped the provider-chain boundary
    #[error("Geocoding error: {message}")]
    Geocoding { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl EntryMapError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a new geocoding error
    pub fn geocoding<S: Into<String>>(message: S) -> Self {
        Self::Geocoding {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            EntryMapError::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            EntryMapError::Store { .. } => {
                "The record store could not be reached. Please try again.".to_string()
            }
            EntryMapError::Geocoding { .. } => {
                "Unable to resolve locations right now. Some markers may be missing.".to_string()
            }
            EntryMapError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            EntryMapError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
            EntryMapError::General { message } => message.clone(),
        }
    }
}

impl From<anyhow::Error> for EntryMapError {
    fn from(err: anyhow::Error) -> Self {
        EntryMapError::Store {
            message: err.to_string(),
        }
    }
}
