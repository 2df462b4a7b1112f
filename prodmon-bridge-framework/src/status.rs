//! Bridge status reporting.

use serde::{Deserialize, Serialize};

use crate::dispatcher::{Delivery, Dispatcher};

/// Bridge status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name (e.g., "plc").
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running", "offline").
    pub status: String,
    /// Additional metadata (bridge-specific).
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    /// Create a new status with "running" state.
    pub fn running(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: "running".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Create a status with "offline" state.
    pub fn offline(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: "offline".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Publishes bridge status on startup and graceful shutdown.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    topic: String,
    bridge_name: String,
    version: String,
}

impl StatusPublisher {
    /// Create a new status publisher.
    pub fn new(
        topic: impl Into<String>,
        bridge_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            bridge_name: bridge_name.into(),
            version: version.into(),
        }
    }

    /// Topic the status records go to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish "running" status with optional metadata.
    pub fn publish_running(
        &self,
        dispatcher: &mut Dispatcher,
        metadata: Option<serde_json::Value>,
    ) -> Delivery {
        let mut status = BridgeStatus::running(&self.bridge_name, &self.version);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        dispatcher.publish(&self.topic, &status)
    }

    /// Publish "offline" status.
    pub fn publish_offline(&self, dispatcher: &mut Dispatcher) -> Delivery {
        let status = BridgeStatus::offline(&self.bridge_name, &self.version);
        dispatcher.publish(&self.topic, &status)
    }
}
