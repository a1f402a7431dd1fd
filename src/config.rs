//! Streaming configuration, loaded from TOML.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::StreamError;

/// Tunable parameters for a streaming session. Every field has a default,
/// so a partial configuration file works.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Serial baud rate.
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Outstanding-window capacity: how many unacknowledged commands the
    /// device buffer is trusted to hold. 0 means lockstep (wait for
    /// acknowledgment after every command).
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Bytes requested per poll read.
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
    /// Per-read blocking timeout.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Total time one drain cycle may spend waiting for acknowledgments.
    #[serde(default = "default_ack_wait_ms")]
    pub ack_wait_ms: u64,
    /// Write retry budget for allow-listed commands.
    #[serde(default = "default_safe_retries")]
    pub safe_retries: u32,
    /// Pause between write retry attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_baud() -> u32 {
    115200
}

fn default_window_size() -> usize {
    10
}

fn default_read_chunk() -> usize {
    3
}

fn default_read_timeout_ms() -> u64 {
    200
}

fn default_write_timeout_ms() -> u64 {
    1000
}

fn default_ack_wait_ms() -> u64 {
    2000
}

fn default_safe_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            baud: default_baud(),
            window_size: default_window_size(),
            read_chunk: default_read_chunk(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            ack_wait_ms: default_ack_wait_ms(),
            safe_retries: default_safe_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl StreamConfig {
    pub fn load(path: &Path) -> Result<Self, StreamError> {
        let content = fs::read_to_string(path)?;
        let config: StreamConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.baud == 0 {
            return Err(StreamError::InvalidConfig("baud must be non-zero".into()));
        }
        if self.read_chunk == 0 {
            return Err(StreamError::InvalidConfig(
                "read_chunk must be non-zero".into(),
            ));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(StreamError::InvalidConfig(
                "timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Poll iterations allowed in one drain cycle before it gives up.
    pub fn max_polls(&self) -> usize {
        ((self.ack_wait_ms / self.read_timeout_ms.max(1)) as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.baud, 115200);
        assert_eq!(config.window_size, 10);
        assert_eq!(config.read_chunk, 3);
        assert_eq!(config.read_timeout_ms, 200);
        assert_eq!(config.ack_wait_ms, 2000);
        assert_eq!(config.safe_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            baud = 250000
            window_size = 4
        "#;
        let config: StreamConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.baud, 250000);
        assert_eq!(config.window_size, 4);
        assert_eq!(config.read_chunk, 3);
        assert_eq!(config.safe_retries, 3);
    }

    #[test]
    fn test_validate_rejects_zero_baud() {
        let config = StreamConfig {
            baud: 0,
            ..StreamConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_read_chunk() {
        let config = StreamConfig {
            read_chunk: 0,
            ..StreamConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_polls_from_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.max_polls(), 10);
    }

    #[test]
    fn test_max_polls_never_zero() {
        let config = StreamConfig {
            ack_wait_ms: 50,
            read_timeout_ms: 200,
            ..StreamConfig::default()
        };
        assert_eq!(config.max_polls(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "window_size = 0\nread_chunk = 8").unwrap();
        let config = StreamConfig::load(file.path()).unwrap();
        assert_eq!(config.window_size, 0);
        assert_eq!(config.read_chunk, 8);
        assert_eq!(config.baud, 115200);
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "window_size = ").unwrap();
        assert!(StreamConfig::load(file.path()).is_err());
    }
}
