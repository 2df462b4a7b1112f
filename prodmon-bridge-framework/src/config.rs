//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{LoggingConfig, MqttConfig};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use prodmon_bridge_framework::{BridgeConfig, BridgeError, LoggingConfig, MqttConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub mqtt: MqttConfig,
///     pub logging: LoggingConfig,
///     pub devices: Vec<MyDevice>,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn mqtt(&self) -> &MqttConfig {
///         &self.mqtt
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> Result<()> {
///         if self.devices.is_empty() {
///             return Err(BridgeError::validation("At least one device required"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the MQTT broker configuration.
    fn mqtt(&self) -> &MqttConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        validate_mqtt(self.mqtt())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let config: Self = prodmon_common::load_config(path)?;

        config.validate()?;

        Ok(config)
    }
}

/// Checks shared by every bridge: broker address and reconnect policy.
pub fn validate_mqtt(mqtt: &MqttConfig) -> Result<()> {
    if mqtt.host.is_empty() {
        return Err(BridgeError::validation("mqtt.host cannot be empty"));
    }

    if mqtt.client_id.is_empty() {
        return Err(BridgeError::validation("mqtt.client_id cannot be empty"));
    }

    if mqtt.request_capacity == 0 {
        return Err(BridgeError::validation(
            "mqtt.request_capacity must be at least 1",
        ));
    }

    let reconnect = &mqtt.reconnect;
    if reconnect.max_attempts == 0 {
        return Err(BridgeError::validation(
            "mqtt.reconnect.max_attempts must be at least 1",
        ));
    }
    if reconnect.backoff_rate == 0 {
        return Err(BridgeError::validation(
            "mqtt.reconnect.backoff_rate must be at least 1",
        ));
    }
    if reconnect.first_delay_secs > reconnect.max_delay_secs {
        return Err(BridgeError::validation(
            "mqtt.reconnect.first_delay_secs exceeds max_delay_secs",
        ));
    }

    Ok(())
}
