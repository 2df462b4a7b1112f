//! Error types for the bridge framework.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can stop a bridge.
///
/// Transient conditions (a failed tag read, a rejected publish) never surface
/// here; they are logged where they happen.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Broker connection error.
    #[error("MQTT connection error: {0}")]
    Connection(String),

    /// The broker stayed unreachable for the whole reconnect budget.
    #[error("Reconnect failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Whether this error belongs to the configuration boundary.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::ConfigNotFound { .. }
                | Self::ConfigParse(_)
                | Self::ConfigValidation(_)
        )
    }
}

impl From<prodmon_common::Error> for BridgeError {
    fn from(err: prodmon_common::Error) -> Self {
        match err {
            prodmon_common::Error::Io(e) => Self::Io(e),
            other => Self::ConfigParse(other.to_string()),
        }
    }
}
