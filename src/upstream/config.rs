//! Upstream connection configuration

use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

/// Configuration for the upstream request
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Source MJPEG URL
    pub url: String,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// User-Agent sent to the camera
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(5),
            user_agent: concat!("mjpeg-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Create a config for the given source URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Parse and check the source URL
    ///
    /// Only `http` and `https` sources can be streamed.
    pub fn parse_url(&self) -> Result<Url, ConfigError> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingUpstreamUrl);
        }

        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUpstreamUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::InvalidUpstreamUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme {:?}", scheme),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        let config = UpstreamConfig::new("http://10.0.0.5:8081/?action=stream");
        let url = config.parse_url().unwrap();

        assert_eq!(url.host_str(), Some("10.0.0.5"));
        assert_eq!(url.port(), Some(8081));
    }

    #[test]
    fn test_missing_url() {
        let config = UpstreamConfig::default();
        assert!(matches!(
            config.parse_url(),
            Err(ConfigError::MissingUpstreamUrl)
        ));

        let blank = UpstreamConfig::new("   ");
        assert!(matches!(
            blank.parse_url(),
            Err(ConfigError::MissingUpstreamUrl)
        ));
    }

    #[test]
    fn test_invalid_url() {
        let config = UpstreamConfig::new("not a url");
        assert!(matches!(
            config.parse_url(),
            Err(ConfigError::InvalidUpstreamUrl { .. })
        ));

        let rtsp = UpstreamConfig::new("rtsp://camera/stream");
        assert!(matches!(
            rtsp.parse_url(),
            Err(ConfigError::InvalidUpstreamUrl { .. })
        ));
    }

    #[test]
    fn test_builder() {
        let config = UpstreamConfig::new("http://camera/video.mjpg")
            .connect_timeout(Duration::from_secs(2))
            .user_agent("test-agent");

        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.user_agent, "test-agent");
    }
}
