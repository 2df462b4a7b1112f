use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// MQTT broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Optional username.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,

    /// Delivery class for every published message.
    #[serde(default)]
    pub qos: QosLevel,

    /// Upper bound of a single event-loop step, in milliseconds.
    #[serde(default = "default_event_timeout_ms")]
    pub event_timeout_ms: u64,

    /// Bound on a single connect attempt, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Capacity of the client's outgoing request queue.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,

    /// Reconnect backoff after an unsolicited disconnect.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Topic for bridge status records (disabled when absent).
    #[serde(default)]
    pub status_topic: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "prodmon-bridge".to_string()
}

fn default_keep_alive() -> u64 {
    5
}

fn default_event_timeout_ms() -> u64 {
    100
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_capacity() -> usize {
    100
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            username: None,
            password: None,
            qos: QosLevel::default(),
            event_timeout_ms: default_event_timeout_ms(),
            connect_timeout_secs: default_connect_timeout(),
            request_capacity: default_request_capacity(),
            reconnect: ReconnectConfig::default(),
            status_topic: None,
        }
    }
}

/// MQTT delivery class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QosLevel {
    /// QoS 0.
    AtMostOnce,
    /// QoS 1 (default).
    #[default]
    AtLeastOnce,
    /// QoS 2.
    ExactlyOnce,
}

/// Bounded exponential backoff used after the broker connection drops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt, in seconds.
    #[serde(default = "default_first_delay")]
    pub first_delay_secs: u64,

    /// Multiplier applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: u32,

    /// Cap on the delay between attempts, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Failed attempts allowed before the bridge gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_first_delay() -> u64 {
    1
}

fn default_backoff_rate() -> u32 {
    2
}

fn default_max_delay() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    12
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            first_delay_secs: default_first_delay(),
            backoff_rate: default_backoff_rate(),
            max_delay_secs: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
