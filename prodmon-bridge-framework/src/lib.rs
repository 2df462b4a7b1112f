//! prodmon Bridge Framework
//!
//! The polling engine and MQTT plumbing shared by prodmon bridges.
//!
//! # Overview
//!
//! This framework provides:
//! - [`Scheduler`] the single-threaded loop visiting every [`PollTarget`]
//! - [`Dispatcher`] for publishing JSON payloads with delivery-status logging
//! - [`ConnectionSupervisor`] for bounded exponential-backoff reconnects
//! - [`PublishTransport`] and [`ConnectionDriver`], the transport seams, with
//!   an MQTT implementation in [`mqtt`]
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for the bridge lifecycle (connect, run, Ctrl+C, status)
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use prodmon_bridge_framework::run_bridge;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_bridge::<MyBridgeConfig, _, _>("mybridge", "/etc/prodmon/mybridge.json5", |config| {
//!         build_devices(config)
//!     })
//!     .await
//! }
//! ```

mod args;
mod config;
mod dispatcher;
mod error;
pub mod mqtt;
mod runner;
mod scheduler;
mod shutdown;
mod status;
mod supervisor;
mod transport;

pub use args::BridgeArgs;
pub use config::{BridgeConfig, validate_mqtt};
pub use dispatcher::{Delivery, Dispatcher, PublishStats};
pub use error::{BridgeError, Result};
pub use runner::{BridgeRunner, init_logging, run_bridge};
pub use scheduler::{PollTarget, Scheduler, SchedulerExit};
pub use shutdown::{ShutdownSignal, ShutdownTrigger, shutdown_channel};
pub use status::{BridgeStatus, StatusPublisher};
pub use supervisor::{ConnectionSupervisor, ReconnectPolicy, SupervisorState};
pub use transport::{ConnectionDriver, ConnectionEvent, PublishTransport, TransportError};

// Re-export commonly used types from prodmon-common
pub use prodmon_common::{LoggingConfig, MqttConfig, QosLevel, ReconnectConfig, TagValue};
