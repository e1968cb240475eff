use crate::constants::{DEFAULT_READ_TIMEOUT, DEFAULT_STREAM_BUFFER};
use crate::error::OiError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which frame bytes the stream checksum covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumMode {
    /// Length byte, packet bytes and checksum sum to zero; the 0x13 marker is
    /// left out.
    #[default]
    ExcludeMarker,
    /// Every frame byte, marker included, sums to zero.
    IncludeMarker,
}

/// Driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Deadline for a single transport read or write; `None` blocks
    /// indefinitely.
    pub read_timeout: Option<Duration>,
    pub checksum: ChecksumMode,
    /// After a bad frame, scan forward for the next marker instead of
    /// discarding the whole buffer.
    pub resync: bool,
    /// Frames buffered between the stream worker and the consumer.
    pub stream_buffer: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            checksum: ChecksumMode::default(),
            resync: true,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl DriverConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, OiError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumMode) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_resync(mut self, resync: bool) -> Self {
        self.resync = resync;
        self
    }

    pub fn with_stream_buffer(mut self, frames: usize) -> Self {
        self.stream_buffer = frames.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.read_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.checksum, ChecksumMode::ExcludeMarker);
        assert!(config.resync);
        assert_eq!(config.stream_buffer, 16);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = DriverConfig::from_json(r#"{ "checksum": "include_marker", "resync": false }"#).unwrap();
        assert_eq!(config.checksum, ChecksumMode::IncludeMarker);
        assert!(!config.resync);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn json_round_trips_timeout() {
        let config = DriverConfig::default().with_read_timeout(Some(Duration::from_millis(250)));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(DriverConfig::from_json(&json).unwrap(), config);

        let config = DriverConfig::from_json(r#"{ "read_timeout": null }"#).unwrap();
        assert_eq!(config.read_timeout, None);
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(
            DriverConfig::from_json(r#"{ "checksum": "sometimes" }"#),
            Err(OiError::Config(_))
        ));
    }

    #[test]
    fn stream_buffer_is_at_least_one() {
        assert_eq!(DriverConfig::default().with_stream_buffer(0).stream_buffer, 1);
    }
}
