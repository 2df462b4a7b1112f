//! prodmon bridge for PLC tag polling.
//!
//! This bridge polls controllers (Modbus TCP or RTU/serial) for configured
//! tags and publishes state changes to an MQTT broker.
//!
//! # Topics
//!
//! ```text
//! ping/<tag>                              {timestamp, name}
//! counter/<machine>                       {asset, part, timestamp, perpetualcount, count}
//! data/<device>/<source_tag>/<local_tag>/ {data, tag}
//! ```
//!
//! Where:
//! - `<tag>` - Ping tag name; `name` in the payload is the device name
//! - `<machine>` - Counter machine label, one message per counted unit
//! - `<source_tag>` - Register address the value was read from
//! - `<local_tag>` - Data tag name from configuration

pub mod config;
pub mod device;
pub mod reader;
pub mod tags;

pub use config::PlcBridgeConfig;
pub use device::{Device, DeviceHandle, build_devices, build_tags};
pub use reader::{ModbusReader, ReadError, TagReader, TagReading};
pub use tags::{Cadence, CounterState, CounterTag, DataTag, PartSource, PingTag, Tag};
