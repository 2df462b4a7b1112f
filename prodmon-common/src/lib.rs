//! prodmon Common Library
//!
//! This crate provides shared types and utilities for prodmon PLC bridges:
//!
//! - [`payload`] - Message payloads (`PingPayload`, `CounterPayload`, `DataPayload`) and `TagValue`
//! - [`topic`] - Topic builders for the published message stream
//! - [`serialization`] - JSON encoding and decoding
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod payload;
pub mod serialization;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{
    LogFormat, LoggingConfig, MqttConfig, QosLevel, ReconnectConfig, load_config, parse_config,
};
pub use error::{Error, Result};
pub use payload::{CounterPayload, DataPayload, PingPayload, TagValue, unix_timestamp};
pub use serialization::{decode, encode};
pub use topic::{counter_topic, data_topic, ping_topic};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG`, when set, takes precedence over `config.level`.
///
/// # Example
///
/// ```ignore
/// use prodmon_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
