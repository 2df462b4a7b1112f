//! Register reads from controllers.
//!
//! [`TagReader`] is the read capability a [`Device`](crate::device::Device)
//! hands to its tags. [`ModbusReader`] implements it over Modbus TCP or RTU.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use prodmon_common::TagValue;
use thiserror::Error;
use tokio_modbus::Slave;
use tokio_modbus::client::{Context, Reader, rtu, tcp};

use crate::config::{ConnectionConfig, DeviceConfig};

/// Reasons a read produced no usable values.
///
/// Every variant is transient: the tick is abandoned and the next cadence
/// retries.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    #[error("read failed: {0}")]
    Read(String),
    #[error("exception response: {0}")]
    Exception(String),
    #[error("expected {expected} values, got {actual}")]
    ResponseLength { expected: usize, actual: usize },
    #[error("invalid address: {0}")]
    Address(String),
}

/// One value returned by a read, named by the tag it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TagReading {
    pub name: String,
    pub value: TagValue,
}

impl TagReading {
    pub fn new(name: impl Into<String>, value: impl Into<TagValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Batched register reads against one controller.
pub trait TagReader {
    /// Read every address, returning values in request order.
    ///
    /// Either all values come back or the whole read fails.
    fn read(
        &mut self,
        addresses: &[&str],
    ) -> impl Future<Output = Result<Vec<TagReading>, ReadError>>;
}

/// Modbus register types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterType {
    /// Discrete output coils (read/write, 1-bit)
    Coil,
    /// Discrete input contacts (read-only, 1-bit)
    Discrete,
    /// Input registers (read-only, 16-bit)
    Input,
    /// Holding registers (read/write, 16-bit)
    Holding,
}

impl RegisterType {
    /// Return the string name for this register type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterType::Coil => "coil",
            RegisterType::Discrete => "discrete",
            RegisterType::Input => "input",
            RegisterType::Holding => "holding",
        }
    }

    fn is_bit(&self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::Discrete)
    }
}

/// Data type interpretation for 16-bit registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataType {
    /// Unsigned 16-bit integer (default)
    #[default]
    U16,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 32-bit integer (2 registers, big-endian)
    U32,
    /// Signed 32-bit integer (2 registers, big-endian)
    I32,
    /// 32-bit float (2 registers, big-endian)
    F32,
    /// Unsigned 32-bit integer (2 registers, little-endian word order)
    U32Le,
    /// Signed 32-bit integer (2 registers, little-endian word order)
    I32Le,
    /// 32-bit float (2 registers, little-endian word order)
    F32Le,
}

impl DataType {
    /// Number of 16-bit registers one value occupies.
    pub fn registers(&self) -> u16 {
        match self {
            DataType::U16 | DataType::I16 => 1,
            _ => 2,
        }
    }

    /// Decode one value from raw registers.
    pub fn decode(&self, data: &[u16]) -> Option<TagValue> {
        let word = |hi: u16, lo: u16| ((hi as u32) << 16) | (lo as u32);

        let value = match (self, data) {
            (DataType::U16, [a, ..]) => TagValue::Int(*a as i64),
            (DataType::I16, [a, ..]) => TagValue::Int(*a as i16 as i64),
            (DataType::U32, [a, b, ..]) => TagValue::Int(word(*a, *b) as i64),
            (DataType::I32, [a, b, ..]) => TagValue::Int(word(*a, *b) as i32 as i64),
            (DataType::F32, [a, b, ..]) => TagValue::Float(f32::from_bits(word(*a, *b)) as f64),
            (DataType::U32Le, [a, b, ..]) => TagValue::Int(word(*b, *a) as i64),
            (DataType::I32Le, [a, b, ..]) => TagValue::Int(word(*b, *a) as i32 as i64),
            (DataType::F32Le, [a, b, ..]) => {
                TagValue::Float(f32::from_bits(word(*b, *a)) as f64)
            }
            _ => return None,
        };

        Some(value)
    }
}

impl FromStr for DataType {
    type Err = ReadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "u16" => Ok(DataType::U16),
            "i16" => Ok(DataType::I16),
            "u32" => Ok(DataType::U32),
            "i32" => Ok(DataType::I32),
            "f32" => Ok(DataType::F32),
            "u32le" => Ok(DataType::U32Le),
            "i32le" => Ok(DataType::I32Le),
            "f32le" => Ok(DataType::F32Le),
            other => Err(ReadError::Address(format!("unknown data type '{}'", other))),
        }
    }
}

/// A parsed tag address: `<register>:<offset>[:<data_type>]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusAddress {
    pub register: RegisterType,
    pub offset: u16,
    pub data_type: DataType,
}

impl ModbusAddress {
    /// Whether readings from this address decode to integers.
    pub fn is_integer(&self) -> bool {
        !self.register.is_bit() && !matches!(self.data_type, DataType::F32 | DataType::F32Le)
    }
}

impl FromStr for ModbusAddress {
    type Err = ReadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');

        let register = match parts.next() {
            Some("coil") => RegisterType::Coil,
            Some("discrete") => RegisterType::Discrete,
            Some("input") => RegisterType::Input,
            Some("holding") => RegisterType::Holding,
            _ => {
                return Err(ReadError::Address(format!(
                    "'{}' must start with coil, discrete, input or holding",
                    s
                )));
            }
        };

        let offset = parts
            .next()
            .and_then(|o| o.parse::<u16>().ok())
            .ok_or_else(|| ReadError::Address(format!("'{}' has no valid register offset", s)))?;

        let data_type = match parts.next() {
            Some(_) if register.is_bit() => {
                return Err(ReadError::Address(format!(
                    "'{}': {} registers take no data type",
                    s,
                    register.as_str()
                )));
            }
            Some(dt) => dt.parse()?,
            None => DataType::default(),
        };

        if parts.next().is_some() {
            return Err(ReadError::Address(format!("'{}' has too many parts", s)));
        }

        Ok(Self {
            register,
            offset,
            data_type,
        })
    }
}

impl fmt::Display for ModbusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.register.as_str(), self.offset)
    }
}

/// Reads tags from one Modbus device.
///
/// The connection is opened on first use and dropped after any failed read,
/// so the next cadence re-dials.
pub struct ModbusReader {
    device: String,
    connection: ConnectionConfig,
    unit_id: u8,
    timeout: Duration,
    ctx: Option<Context>,
}

impl ModbusReader {
    /// Create a reader for a configured device. Nothing is dialed yet.
    pub fn new(device: &DeviceConfig) -> Self {
        Self {
            device: device.name.clone(),
            connection: device.connection.clone(),
            unit_id: device.unit_id,
            timeout: device.timeout(),
            ctx: None,
        }
    }

    /// Whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn read_all(&mut self, addresses: &[ModbusAddress]) -> Result<Vec<TagValue>, ReadError> {
        let ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => {
                let ctx = connect(&self.connection, self.unit_id).await?;
                tracing::info!(device = %self.device, "Connected to controller");
                ctx
            }
        };
        let ctx = self.ctx.insert(ctx);

        let mut values = Vec::with_capacity(addresses.len());
        for address in addresses {
            values.push(read_address(ctx, address).await?);
        }
        Ok(values)
    }
}

impl TagReader for ModbusReader {
    async fn read(&mut self, addresses: &[&str]) -> Result<Vec<TagReading>, ReadError> {
        let parsed = addresses
            .iter()
            .map(|a| a.parse::<ModbusAddress>())
            .collect::<Result<Vec<_>, _>>()?;

        let limit = self.timeout;
        let outcome = match tokio::time::timeout(limit, self.read_all(&parsed)).await {
            Ok(result) => result,
            Err(_) => Err(ReadError::Timeout(limit)),
        };

        match outcome {
            Ok(values) => Ok(addresses
                .iter()
                .zip(values)
                .map(|(name, value)| TagReading::new(*name, value))
                .collect()),
            Err(e) => {
                if self.ctx.take().is_some() {
                    tracing::debug!(
                        device = %self.device,
                        error = %e,
                        "Dropping controller connection"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Connect to the Modbus device.
async fn connect(connection: &ConnectionConfig, unit_id: u8) -> Result<Context, ReadError> {
    let slave = Slave(unit_id);

    match connection {
        ConnectionConfig::Tcp { host, port } => {
            let addr = tokio::net::lookup_host((host.as_str(), *port))
                .await
                .map_err(|e| ReadError::Connection(format!("Invalid address: {}", e)))?
                .next()
                .ok_or_else(|| {
                    ReadError::Connection(format!("No address found for {}:{}", host, port))
                })?;

            tcp::connect_slave(addr, slave)
                .await
                .map_err(|e| ReadError::Connection(e.to_string()))
        }
        ConnectionConfig::Rtu {
            port,
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        } => {
            let parity = match parity.to_lowercase().as_str() {
                "even" => tokio_serial::Parity::Even,
                "odd" => tokio_serial::Parity::Odd,
                _ => tokio_serial::Parity::None,
            };

            let stop_bits = match stop_bits {
                2 => tokio_serial::StopBits::Two,
                _ => tokio_serial::StopBits::One,
            };

            let data_bits = match data_bits {
                5 => tokio_serial::DataBits::Five,
                6 => tokio_serial::DataBits::Six,
                7 => tokio_serial::DataBits::Seven,
                _ => tokio_serial::DataBits::Eight,
            };

            let builder = tokio_serial::new(port, *baud_rate)
                .parity(parity)
                .stop_bits(stop_bits)
                .data_bits(data_bits);

            let serial = tokio_serial::SerialStream::open(&builder)
                .map_err(|e| ReadError::Connection(format!("Serial open failed: {}", e)))?;

            Ok(rtu::attach_slave(serial, slave))
        }
    }
}

/// Read and decode the value at one address.
async fn read_address(ctx: &mut Context, address: &ModbusAddress) -> Result<TagValue, ReadError> {
    let count = address.data_type.registers();

    let registers = match address.register {
        RegisterType::Coil => {
            let bits = ctx
                .read_coils(address.offset, 1)
                .await
                .map_err(|e| ReadError::Read(e.to_string()))?
                .map_err(|e| ReadError::Exception(format!("{:?}", e)))?;
            return first_bit(&bits, address);
        }
        RegisterType::Discrete => {
            let bits = ctx
                .read_discrete_inputs(address.offset, 1)
                .await
                .map_err(|e| ReadError::Read(e.to_string()))?
                .map_err(|e| ReadError::Exception(format!("{:?}", e)))?;
            return first_bit(&bits, address);
        }
        RegisterType::Input => ctx
            .read_input_registers(address.offset, count)
            .await
            .map_err(|e| ReadError::Read(e.to_string()))?
            .map_err(|e| ReadError::Exception(format!("{:?}", e)))?,
        RegisterType::Holding => ctx
            .read_holding_registers(address.offset, count)
            .await
            .map_err(|e| ReadError::Read(e.to_string()))?
            .map_err(|e| ReadError::Exception(format!("{:?}", e)))?,
    };

    address
        .data_type
        .decode(&registers)
        .ok_or(ReadError::ResponseLength {
            expected: count as usize,
            actual: registers.len(),
        })
}

fn first_bit(bits: &[bool], address: &ModbusAddress) -> Result<TagValue, ReadError> {
    bits.first()
        .map(|b| TagValue::Bool(*b))
        .ok_or_else(|| ReadError::Read(format!("empty response for {}", address)))
}
