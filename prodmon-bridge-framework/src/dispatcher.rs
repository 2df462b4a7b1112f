//! Message dispatch to the publish transport.

use prodmon_common::{QosLevel, encode};
use serde::Serialize;

use crate::transport::PublishTransport;

/// Outcome of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The local client accepted the message.
    Accepted,
    /// The message was rejected and dropped.
    Dropped,
}

/// Serializes payloads and hands them to the publish transport.
///
/// Delivery failures are logged and the message is dropped. There is no
/// retry queue; redelivery past this point belongs to the transport's QoS.
pub struct Dispatcher {
    transport: Box<dyn PublishTransport>,
    qos: QosLevel,
    stats: PublishStats,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(transport: Box<dyn PublishTransport>, qos: QosLevel) -> Self {
        Self {
            transport,
            qos,
            stats: PublishStats::default(),
        }
    }

    /// Get the delivery class used for every message.
    pub fn qos(&self) -> QosLevel {
        self.qos
    }

    /// Counters of accepted and dropped messages so far.
    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    /// Publish a payload as JSON on `topic`.
    pub fn publish<T: Serialize>(&mut self, topic: &str, payload: &T) -> Delivery {
        let bytes = match encode(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!(topic = %topic, error = %e, "Failed to encode payload");
                return Delivery::Dropped;
            }
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();

        match self.transport.publish(topic, bytes, self.qos) {
            Ok(()) => {
                self.stats.success += 1;
                tracing::info!(topic = %topic, payload = %text, "Sent");
                Delivery::Accepted
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!(topic = %topic, payload = %text, error = %e, "MQTT send failed");
                Delivery::Dropped
            }
        }
    }
}

/// Statistics of dispatched messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of accepted messages.
    pub success: usize,
    /// Number of dropped messages.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            100.0
        } else {
            (self.success as f64 / self.total() as f64) * 100.0
        }
    }
}
