//! Error types and handling for Sunward
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Sunward operations
pub type Result<T> = std::result::Result<T, SunwardError>;

/// Main error type for Sunward
#[derive(Debug, Error)]
pub enum SunwardError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Inverter (Modbus) communication errors
    #[error("Inverter error: {message}")]
    Inverter { message: String },

    /// Vehicle API errors
    #[error("Vehicle error: {message}")]
    Vehicle { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl SunwardError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        SunwardError::Config {
            message: message.into(),
        }
    }

    /// Create a new inverter error
    pub fn inverter<S: Into<String>>(message: S) -> Self {
        SunwardError::Inverter {
            message: message.into(),
        }
    }

    /// Create a new vehicle error
    pub fn vehicle<S: Into<String>>(message: S) -> Self {
        SunwardError::Vehicle {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        SunwardError::Network {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        SunwardError::Io {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        SunwardError::Auth {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        SunwardError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        SunwardError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        SunwardError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for SunwardError {
    fn from(err: std::io::Error) -> Self {
        SunwardError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for SunwardError {
    fn from(err: serde_yaml::Error) -> Self {
        SunwardError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SunwardError {
    fn from(err: serde_json::Error) -> Self {
        SunwardError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for SunwardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SunwardError::timeout(err.to_string())
        } else {
            SunwardError::network(err.to_string())
        }
    }
}
