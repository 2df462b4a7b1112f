//! Controllers and the tags they own.

use prodmon_bridge_framework::{BridgeError, Dispatcher, PollTarget, Result};
use tokio::time::Instant;

use crate::config::{DeviceConfig, DriverKind, PlcBridgeConfig, TagConfig};
use crate::reader::{ModbusReader, ReadError, TagReader, TagReading};
use crate::tags::{CounterTag, DataTag, PartSource, PingTag, Tag};

/// A controller endpoint: one read connection shared by all of its tags.
pub struct Device<R> {
    name: String,
    reader: R,
    tags: Vec<Tag>,
}

impl<R: TagReader> Device<R> {
    pub fn new(name: impl Into<String>, reader: R, tags: Vec<Tag>) -> Self {
        Self {
            name: name.into(),
            reader,
            tags,
        }
    }

    /// Tags in polling order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

impl<R: TagReader> PollTarget for Device<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, dispatcher: &mut Dispatcher) {
        let mut handle = DeviceHandle {
            name: &self.name,
            reader: &mut self.reader,
        };

        for tag in &mut self.tags {
            tag.poll(&mut handle, dispatcher, Instant::now()).await;
        }
    }
}

/// What a tag sees of its owning device while polling.
pub struct DeviceHandle<'a, R> {
    name: &'a str,
    reader: &'a mut R,
}

impl<'a, R: TagReader> DeviceHandle<'a, R> {
    pub fn new(name: &'a str, reader: &'a mut R) -> Self {
        Self { name, reader }
    }

    /// Name of the owning device.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Read `addresses` through the device connection.
    ///
    /// A response with the wrong number of values is a failed read.
    pub async fn read(
        &mut self,
        addresses: &[&str],
    ) -> std::result::Result<Vec<TagReading>, ReadError> {
        let readings = self.reader.read(addresses).await?;

        if readings.len() != addresses.len() {
            return Err(ReadError::ResponseLength {
                expected: addresses.len(),
                actual: readings.len(),
            });
        }

        Ok(readings)
    }
}

/// Build the tags of one device, in configuration order.
pub fn build_tags(device: &DeviceConfig) -> Result<Vec<Tag>> {
    device
        .tags
        .iter()
        .map(|tag| {
            let interval = device.interval(tag);
            let tag = match tag {
                TagConfig::Ping(ping) => {
                    Tag::Ping(PingTag::new(&ping.name, &ping.address, interval))
                }
                TagConfig::Counter(counter) => {
                    let part = match (
                        &counter.part_number_text_tag,
                        &counter.part_number_index_tag,
                    ) {
                        (Some(address), _) => PartSource::Text {
                            address: address.clone(),
                        },
                        (None, Some(address)) => PartSource::Index {
                            address: address.clone(),
                            part_dict: counter.part_dict.clone(),
                        },
                        (None, None) => {
                            return Err(BridgeError::validation(format!(
                                "Device '{}': counter '{}' has no part number tag",
                                device.name, counter.machine
                            )));
                        }
                    };
                    Tag::Counter(CounterTag::new(
                        &counter.address,
                        counter.scale,
                        &counter.machine,
                        part,
                        interval,
                    ))
                }
                TagConfig::Data(data) => Tag::Data(
                    DataTag::new(&data.name, &data.address, interval)
                        .with_publish_first(data.publish_first),
                ),
            };
            Ok(tag)
        })
        .collect()
}

/// Build every configured device with its driver's reader.
pub fn build_devices(config: &PlcBridgeConfig) -> Result<Vec<Device<ModbusReader>>> {
    config
        .plc
        .devices
        .iter()
        .map(|device| {
            let reader = match device.driver {
                DriverKind::Modbus => ModbusReader::new(device),
            };
            let tags = build_tags(device)?;

            tracing::info!(
                device = %device.name,
                driver = ?device.driver,
                connection = ?device.connection,
                tags = tags.len(),
                "Configured device"
            );

            Ok(Device::new(&device.name, reader, tags))
        })
        .collect()
}
