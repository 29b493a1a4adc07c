//! Client and polling configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Result, ViconError, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT, MIN_FRAME_LENGTH};

/// Connection settings for a [`ViconTcpClient`](crate::tcp::ViconTcpClient).
///
/// Timeouts are optional. When unset, the corresponding operation waits
/// for as long as the operating system allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Limit on establishing the TCP connection
    pub connect_timeout_ms: Option<u64>,
    /// Limit on waiting for response bytes
    pub read_timeout_ms: Option<u64>,
    /// Limit on writing a request frame
    pub write_timeout_ms: Option<u64>,
    /// Largest accepted length field on a response frame
    pub max_frame_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// `host:port` string used for connecting and in log messages.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ViconError::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ViconError::Config("port must not be 0".into()));
        }
        if self.max_frame_size < MIN_FRAME_LENGTH {
            return Err(ViconError::Config(format!(
                "max_frame_size must be at least {}",
                MIN_FRAME_LENGTH
            )));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(ViconError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ViconError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for the frame polling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Subject to track
    pub subject: String,
    /// Segment of `subject` to query
    pub segment: String,
    /// Pause between requesting a frame and querying it
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause after enabling segment data, before the first frame request
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Pause after a frame in which the object was not found
    #[serde(default = "default_missing_backoff_ms")]
    pub missing_backoff_ms: u64,
    /// Stop after this many decoded samples
    #[serde(default)]
    pub max_frames: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_missing_backoff_ms() -> u64 {
    1000
}

impl PollerConfig {
    /// Track a rigid object whose single segment shares its name.
    pub fn new(object: impl Into<String>) -> Self {
        let object = object.into();
        Self {
            segment: object.clone(),
            subject: object,
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            missing_backoff_ms: default_missing_backoff_ms(),
            max_frames: None,
        }
    }

    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = segment.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_to_ms(interval);
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = duration_to_ms(delay);
        self
    }

    pub fn with_missing_backoff(mut self, backoff: Duration) -> Self {
        self.missing_backoff_ms = duration_to_ms(backoff);
        self
    }

    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn missing_backoff(&self) -> Duration {
        Duration::from_millis(self.missing_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subject.is_empty() || self.segment.is_empty() {
            return Err(ViconError::Config(
                "subject and segment names must not be empty".into(),
            ));
        }
        for name in [&self.subject, &self.segment] {
            if name.contains('\0') {
                return Err(ViconError::InvalidName(name.clone()));
            }
        }
        Ok(())
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 801);
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_builder_setters() {
        let config = ClientConfig::new("192.168.30.152", 801)
            .with_connect_timeout(Duration::from_secs(2))
            .with_read_timeout(Duration::from_millis(500));
        assert_eq!(config.address(), "192.168.30.152:801");
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.write_timeout(), None);
    }

    #[test]
    fn test_client_from_json_fills_defaults() {
        let config =
            ClientConfig::from_json_str(r#"{ "host": "vicon.local", "read_timeout_ms": 250 }"#)
                .unwrap();
        assert_eq!(config.host, "vicon.local");
        assert_eq!(config.port, 801);
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_client_validation_errors() {
        assert!(ClientConfig::new("", 801).validate().is_err());
        assert!(ClientConfig::new("host", 0).validate().is_err());
        assert!(ClientConfig::new("host", 801)
            .with_max_frame_size(3)
            .validate()
            .is_err());
        assert!(ClientConfig::new("host", 801)
            .with_read_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(matches!(
            ClientConfig::from_json_str("{ not json"),
            Err(ViconError::Config(_))
        ));
    }

    #[test]
    fn test_poller_single_object() {
        let config = PollerConfig::new("robot_1");
        assert_eq!(config.subject, "robot_1");
        assert_eq!(config.segment, "robot_1");
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.settle_delay(), Duration::from_millis(100));
        assert_eq!(config.missing_backoff(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poller_from_json() {
        let config: PollerConfig =
            serde_json::from_str(r#"{ "subject": "arm", "segment": "wrist", "max_frames": 5 }"#)
                .unwrap();
        assert_eq!(config.segment, "wrist");
        assert_eq!(config.max_frames, Some(5));
        assert_eq!(config.poll_interval_ms, 10);
    }

    #[test]
    fn test_poller_rejects_bad_names() {
        assert!(PollerConfig::new("").validate().is_err());
        assert!(matches!(
            PollerConfig::new("a\0b").validate(),
            Err(ViconError::InvalidName(_))
        ));
    }
}
