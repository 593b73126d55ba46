//! Error types for the relay
//!
//! Only configuration errors are fatal. Everything else is logged and
//! absorbed by the engine: upstream failures are healed by the watchdog,
//! consumer failures only affect the consumer that caused them.

use reqwest::StatusCode;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid startup configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The upstream `content-type` carries no usable `boundary=` parameter
    #[error("no boundary found in content-type: {0:?}")]
    MalformedContentType(String),

    /// Request or body transport failure talking to the upstream camera
    #[error("upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("upstream returned status {0}")]
    UpstreamStatus(StatusCode),

    /// The relay engine task is no longer running
    #[error("relay engine closed")]
    EngineClosed,
}

/// Configuration errors, raised before anything is started
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing upstream MJPEG URL")]
    MissingUpstreamUrl,

    #[error("invalid upstream URL {url:?}: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    /// Tick interval must be non-zero and no longer than the stall timeout
    #[error("invalid tick interval: {0:?}")]
    InvalidTickInterval(std::time::Duration),

    /// Default boundary must be non-empty printable ASCII
    #[error("invalid default boundary: {0:?}")]
    InvalidDefaultBoundary(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let err: Error = ConfigError::MissingUpstreamUrl.into();
        assert!(matches!(err, Error::Config(ConfigError::MissingUpstreamUrl)));
        assert_eq!(
            err.to_string(),
            "configuration error: missing upstream MJPEG URL"
        );
    }

    #[test]
    fn test_malformed_content_type_display() {
        let err = Error::MalformedContentType("image/jpeg".into());
        assert_eq!(
            err.to_string(),
            "no boundary found in content-type: \"image/jpeg\""
        );
    }
}
