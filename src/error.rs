//! Error types and handling for Helios
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Helios operations
pub type Result<T> = std::result::Result<T, HeliosError>;

/// Main error type for Helios
#[derive(Debug, Error)]
pub enum HeliosError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Telemetry device offline (treated as zero power until reachable)
    #[error("Telemetry unreachable: {message}")]
    Unreachable { message: String },

    /// Charger read/write returned a malformed or impossible response
    #[error("Charger device error: {message}")]
    Device { message: String },

    /// Vendor session expired; caller should re-authenticate once
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Generic vendor API failure (stale cached value retained)
    #[error("API error: {message}")]
    Api { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl HeliosError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        HeliosError::Config {
            message: message.into(),
        }
    }

    /// Create a new unreachable-device error
    pub fn unreachable<S: Into<String>>(message: S) -> Self {
        HeliosError::Unreachable {
            message: message.into(),
        }
    }

    /// Create a new charger device error
    pub fn device<S: Into<String>>(message: S) -> Self {
        HeliosError::Device {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        HeliosError::Auth {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        HeliosError::Api {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        HeliosError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        HeliosError::Network {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        HeliosError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        HeliosError::Generic {
            message: message.into(),
        }
    }

    /// Whether this error should trigger a collaborator re-login
    pub fn is_auth(&self) -> bool {
        matches!(self, HeliosError::Auth { .. })
    }

    /// Whether this error means the telemetry device is offline
    pub fn is_unreachable(&self) -> bool {
        matches!(self, HeliosError::Unreachable { .. })
    }
}

impl From<std::io::Error> for HeliosError {
    fn from(err: std::io::Error) -> Self {
        HeliosError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeliosError {
    fn from(err: serde_yaml::Error) -> Self {
        HeliosError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HeliosError {
    fn from(err: serde_json::Error) -> Self {
        HeliosError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for HeliosError {
    fn from(err: reqwest::Error) -> Self {
        HeliosError::network(err.to_string())
    }
}

impl From<chrono::ParseError> for HeliosError {
    fn from(err: chrono::ParseError) -> Self {
        HeliosError::validation("datetime", &err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = HeliosError::config("test config error");
        assert!(matches!(err, HeliosError::Config { .. }));

        let err = HeliosError::device("test device error");
        assert!(matches!(err, HeliosError::Device { .. }));

        let err = HeliosError::validation("field", "test validation error");
        assert!(matches!(err, HeliosError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = HeliosError::unreachable("gateway offline");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Telemetry unreachable: gateway offline");

        let err = HeliosError::validation("test_field", "invalid value");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Validation error: test_field - invalid value");
    }

    #[test]
    fn test_error_classification() {
        assert!(HeliosError::auth("expired").is_auth());
        assert!(!HeliosError::api("oops").is_auth());
        assert!(HeliosError::unreachable("down").is_unreachable());
        assert!(!HeliosError::network("down").is_unreachable());
    }
}
