//! Configuration for the PLC bridge.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use prodmon_bridge_framework::{
    BridgeConfig, BridgeError, LoggingConfig, MqttConfig, Result, validate_mqtt,
};
use serde::{Deserialize, Serialize};

use crate::reader::ModbusAddress;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcBridgeConfig {
    /// MQTT broker settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Controllers and their tags
    pub plc: PlcConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig for PlcBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        validate_mqtt(&self.mqtt)?;
        self.plc.validate()
    }
}

/// Controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcConfig {
    /// Devices to poll, in polling order
    pub devices: Vec<DeviceConfig>,
}

/// Configuration for a single controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name (used in topics and log lines)
    pub name: String,

    /// Read protocol spoken by the controller
    pub driver: DriverKind,

    /// Connection type and address
    pub connection: ConnectionConfig,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Default poll interval of the device's tags, in seconds
    #[serde(default = "default_frequency")]
    pub frequency: u64,

    /// Bound on a single read call, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Tags to poll, in polling order
    #[serde(default)]
    pub tags: Vec<TagConfig>,
}

fn default_unit_id() -> u8 {
    1
}

fn default_frequency() -> u64 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

impl DeviceConfig {
    /// Poll interval of `tag`, falling back to the device frequency.
    pub fn interval(&self, tag: &TagConfig) -> Duration {
        Duration::from_secs(tag.frequency().unwrap_or(self.frequency))
    }

    /// Read timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Supported controller drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Modbus TCP or RTU
    Modbus,
}

/// Connection configuration (TCP or RTU).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

/// A tag descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TagConfig {
    /// Liveness ping
    Ping(PingTagConfig),
    /// Part counter
    Counter(CounterTagConfig),
    /// Value published on change
    Data(DataTagConfig),
}

impl TagConfig {
    /// Per-tag cadence override, in seconds.
    pub fn frequency(&self) -> Option<u64> {
        match self {
            TagConfig::Ping(tag) => tag.frequency,
            TagConfig::Counter(tag) => tag.frequency,
            TagConfig::Data(tag) => tag.frequency,
        }
    }

    /// Every register address this tag reads.
    pub fn addresses(&self) -> Vec<&str> {
        match self {
            TagConfig::Ping(tag) => vec![tag.address.as_str()],
            TagConfig::Counter(tag) => {
                let mut addresses = vec![tag.address.as_str()];
                addresses.extend(tag.part_number_text_tag.as_deref());
                addresses.extend(tag.part_number_index_tag.as_deref());
                addresses
            }
            TagConfig::Data(tag) => vec![tag.address.as_str()],
        }
    }
}

/// Ping tag: publishes `ping/<name>` once per interval while the device answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingTagConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub frequency: Option<u64>,
}

/// Counter tag: publishes one `counter/<machine>` message per counted unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterTagConfig {
    /// Address of the raw count
    pub address: String,

    /// Multiplier applied to the raw count (default: 1)
    #[serde(default = "default_scale")]
    pub scale: u64,

    /// Machine label used as topic suffix and `asset`
    pub machine: String,

    /// Address of a tag holding the part number as text
    #[serde(default)]
    pub part_number_text_tag: Option<String>,

    /// Address of a tag holding a part index resolved through `part_dict`
    #[serde(default)]
    pub part_number_index_tag: Option<String>,

    /// Part index (as text) to part label
    #[serde(default)]
    pub part_dict: HashMap<String, String>,

    #[serde(default)]
    pub frequency: Option<u64>,
}

fn default_scale() -> u64 {
    1
}

/// Data tag: publishes the value whenever it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTagConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub frequency: Option<u64>,

    /// Publish the first observed value (default: true)
    #[serde(default = "default_publish_first")]
    pub publish_first: bool,
}

fn default_publish_first() -> bool {
    true
}

impl PlcConfig {
    /// Validate devices and tag descriptors.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(BridgeError::validation(
                "At least one device must be configured",
            ));
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if device.name.is_empty() {
                return Err(BridgeError::validation("Device name cannot be empty"));
            }

            if !names.insert(device.name.as_str()) {
                return Err(BridgeError::validation(format!(
                    "Duplicate device name '{}'",
                    device.name
                )));
            }

            device.validate()?;
        }

        Ok(())
    }
}

impl DeviceConfig {
    fn validate(&self) -> Result<()> {
        if self.unit_id == 0 {
            return Err(BridgeError::validation(format!(
                "Device '{}': unit_id must be 1-247",
                self.name
            )));
        }

        if self.frequency == 0 {
            return Err(BridgeError::validation(format!(
                "Device '{}': frequency must be at least 1 second",
                self.name
            )));
        }

        if self.tags.is_empty() {
            return Err(BridgeError::validation(format!(
                "Device '{}': at least one tag must be configured",
                self.name
            )));
        }

        if let ConnectionConfig::Rtu { parity, .. } = &self.connection {
            match parity.to_lowercase().as_str() {
                "none" | "even" | "odd" => {}
                _ => {
                    return Err(BridgeError::validation(format!(
                        "Device '{}': invalid parity '{}' (use none, even, or odd)",
                        self.name, parity
                    )));
                }
            }
        }

        for tag in &self.tags {
            self.validate_tag(tag)?;
        }

        Ok(())
    }

    fn validate_tag(&self, tag: &TagConfig) -> Result<()> {
        if tag.frequency() == Some(0) {
            return Err(BridgeError::validation(format!(
                "Device '{}': tag frequency must be at least 1 second",
                self.name
            )));
        }

        for address in tag.addresses() {
            address.parse::<ModbusAddress>().map_err(|e| {
                BridgeError::validation(format!("Device '{}': {}", self.name, e))
            })?;
        }

        match tag {
            TagConfig::Ping(ping) if ping.name.is_empty() => Err(BridgeError::validation(
                format!("Device '{}': ping tag name cannot be empty", self.name),
            )),
            TagConfig::Data(data) if data.name.is_empty() => Err(BridgeError::validation(
                format!("Device '{}': data tag name cannot be empty", self.name),
            )),
            TagConfig::Counter(counter) => self.validate_counter(counter),
            _ => Ok(()),
        }
    }

    fn validate_counter(&self, counter: &CounterTagConfig) -> Result<()> {
        if counter.machine.is_empty() {
            return Err(BridgeError::validation(format!(
                "Device '{}': counter machine cannot be empty",
                self.name
            )));
        }

        if counter.scale == 0 {
            return Err(BridgeError::validation(format!(
                "Device '{}': counter '{}' scale must be at least 1",
                self.name, counter.machine
            )));
        }

        let address = counter
            .address
            .parse::<ModbusAddress>()
            .map_err(|e| BridgeError::validation(format!("Device '{}': {}", self.name, e)))?;
        if !address.is_integer() {
            return Err(BridgeError::validation(format!(
                "Device '{}': counter '{}' address '{}' must read an integer register",
                self.name, counter.machine, counter.address
            )));
        }

        match (
            &counter.part_number_text_tag,
            &counter.part_number_index_tag,
        ) {
            (Some(_), None) => Ok(()),
            (None, Some(_)) if counter.part_dict.is_empty() => {
                Err(BridgeError::validation(format!(
                    "Device '{}': counter '{}' uses part_number_index_tag without a part_dict",
                    self.name, counter.machine
                )))
            }
            (None, Some(_)) => Ok(()),
            _ => Err(BridgeError::validation(format!(
                "Device '{}': counter '{}' needs exactly one of part_number_text_tag \
                 or part_number_index_tag",
                self.name, counter.machine
            ))),
        }
    }
}
