//! Seams between the polling engine and the publish/subscribe transport.
//!
//! The transport is split in two halves, mirroring how MQTT clients are
//! built: a cheap publish handle used by every tag, and the connection that
//! owns the network and must be stepped by the main loop.

use std::future::Future;
use std::time::Duration;

use prodmon_common::QosLevel;
use thiserror::Error;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The client refused to accept a message for delivery.
    #[error("publish rejected: {0}")]
    Rejected(String),

    /// The network connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The broker answered CONNECT with a non-zero return code.
    #[error("connection refused with return code {code}")]
    Refused { code: u8 },

    /// No CONNACK arrived in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

/// Hands messages to the transport for delivery.
///
/// Implementations must not block. A message the client cannot take right
/// now is held until the connection is stepped; only a message that can
/// never be delivered is reported as rejected.
pub trait PublishTransport {
    /// Queue `payload` on `topic`. `Ok` means the local client accepted it.
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QosLevel) -> Result<(), TransportError>;
}

/// What one event-loop step observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Nothing happened within the step's time bound.
    Idle,

    /// Acks, keepalives or other traffic were processed.
    Activity,

    /// The broker answered a (re)connect; `code` 0 means accepted.
    Connected { code: u8 },

    /// The connection dropped without being asked to.
    Disconnected { reason: String },
}

/// The connection half of the transport.
pub trait ConnectionDriver {
    /// Service one iteration of the transport's event processing.
    fn step(&mut self) -> impl Future<Output = ConnectionEvent>;

    /// Dial the broker and wait for it to accept the session.
    fn connect(&mut self) -> impl Future<Output = Result<(), TransportError>>;
}
