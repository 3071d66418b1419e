//! # Relay Configuration
//!
//! Every section and key is optional; omitted values fall back to defaults
//! suitable for a Marlin-style printer on a USB serial adapter.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud = 250000
//! read_timeout_ms = 10000
//!
//! [protocol]
//! ack_token = "ok"
//! ack_deadline_ms = 600000
//!
//! [job]
//! temperature_poll_every = 500
//! line_delay_ms = 1
//!
//! [telemetry]
//! idle_poll_interval_secs = 10
//!
//! [web]
//! listen = "0.0.0.0:3000"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub web: WebConfig,
}

/// Device connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Longest silence tolerated while waiting for a line.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Settle time around the firmware-info handshake.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
            read_timeout_ms: default_read_timeout_ms(),
            startup_delay_ms: default_startup_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_ack_token")]
    pub ack_token: String,
    /// Overall bound on one acknowledgment wait, even while lines keep arriving.
    #[serde(default = "default_ack_deadline_ms")]
    pub ack_deadline_ms: u64,
}

impl ProtocolConfig {
    pub fn ack_deadline(&self) -> Duration {
        Duration::from_millis(self.ack_deadline_ms)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            ack_token: default_ack_token(),
            ack_deadline_ms: default_ack_deadline_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
    /// A temperature poll is issued after every this many processed lines.
    #[serde(default = "default_temperature_poll_every")]
    pub temperature_poll_every: usize,
    #[serde(default = "default_line_delay_ms")]
    pub line_delay_ms: u64,
}

impl JobConfig {
    pub fn line_delay(&self) -> Duration {
        Duration::from_millis(self.line_delay_ms)
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            temperature_poll_every: default_temperature_poll_every(),
            line_delay_ms: default_line_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Zero disables idle polling.
    #[serde(default = "default_idle_poll_interval_secs")]
    pub idle_poll_interval_secs: u64,
}

impl TelemetryConfig {
    pub fn idle_poll_interval(&self) -> Option<Duration> {
        match self.idle_poll_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval_secs: default_idle_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud() -> u32 { 115200 }
fn default_read_timeout_ms() -> u64 { 10_000 }
fn default_startup_delay_ms() -> u64 { 1_000 }
fn default_ack_token() -> String { "ok".to_string() }
fn default_ack_deadline_ms() -> u64 { 600_000 }
fn default_temperature_poll_every() -> usize { 500 }
fn default_line_delay_ms() -> u64 { 1 }
fn default_idle_poll_interval_secs() -> u64 { 10 }
fn default_listen() -> String { "0.0.0.0:3000".to_string() }
fn default_event_buffer() -> usize { 256 }

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud, 115200);
        assert_eq!(config.protocol.ack_token, "ok");
        assert_eq!(config.job.temperature_poll_every, 500);
        assert_eq!(config.telemetry.idle_poll_interval(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyACM0"

            [telemetry]
            idle_poll_interval_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud, 115200);
        assert_eq!(config.serial.read_timeout(), Duration::from_secs(10));
        assert_eq!(config.telemetry.idle_poll_interval(), None);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config("/nonexistent/relay.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
