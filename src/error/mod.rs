//! Error handling for the ndt7 client

use thiserror::Error;

/// Custom error types for the ndt7 client
#[derive(Error, Debug, Clone)]
pub enum TestError {
    /// Discovery exhausted its retries without finding a usable server
    #[error("Cannot find a suitable measurement server")]
    NoServerAvailable,

    /// The in-flight discovery request was cancelled
    #[error("Server discovery cancelled")]
    DiscoveryCancelled,

    /// The test was cancelled by the caller
    #[error("Test cancelled")]
    Cancelled,

    /// Transport/open/send failure on the measurement channel
    #[error("Measurement server {server} had an error during the test: {message}")]
    Channel { server: String, message: String },

    /// Malformed measurement JSON (logged and dropped, never fatal)
    #[error("Failed to decode measurement: {0}")]
    Decode(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request errors (discovery call)
    #[error("HTTP request error: {0}")]
    Http(String),
}

impl TestError {
    /// Create a new channel error naming the offending server
    pub fn channel<S: Into<String>, M: Into<String>>(server: S, message: M) -> Self {
        Self::Channel {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode(message.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new HTTP error
    pub fn http<S: Into<String>>(message: S) -> Self {
        Self::Http(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::NoServerAvailable | Self::DiscoveryCancelled => "DISCOVERY",
            Self::Cancelled => "CANCELLED",
            Self::Channel { .. } => "CHANNEL",
            Self::Decode(_) => "DECODE",
            Self::Config(_) => "CONFIG",
            Self::Http(_) => "HTTP",
        }
    }

    /// Check whether this error is a cancellation sentinel.
    ///
    /// Callers are expected to treat cancellation specially (e.g. suppress
    /// an error alert) versus real failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DiscoveryCancelled)
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::NoServerAvailable | Self::Http(_) => 2,
            Self::Channel { .. } => 3,
            Self::Decode(_) => 4,
            Self::Cancelled | Self::DiscoveryCancelled => 5,
        }
    }
}

impl From<serde_json::Error> for TestError {
    fn from(error: serde_json::Error) -> Self {
        Self::decode(error.to_string())
    }
}

impl From<reqwest::Error> for TestError {
    fn from(error: reqwest::Error) -> Self {
        Self::http(error.to_string())
    }
}

impl From<url::ParseError> for TestError {
    fn from(error: url::ParseError) -> Self {
        Self::config(format!("URL parse error: {}", error))
    }
}

/// Custom Result type for the ndt7 client
pub type Result<T> = std::result::Result<T, TestError>;
