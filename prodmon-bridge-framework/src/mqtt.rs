//! MQTT transport built on `rumqttc`.

use std::time::Duration;

use prodmon_common::{MqttConfig, QosLevel};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;

use crate::transport::{ConnectionDriver, ConnectionEvent, PublishTransport, TransportError};

/// Build the two halves of the MQTT transport.
///
/// Nothing touches the network until the connection is first stepped or
/// [`ConnectionDriver::connect`] is awaited.
///
/// Published messages go to an unbounded outbox. Each connection step moves
/// as many of them as the client's request queue can take, so a burst larger
/// than `request_capacity` waits in order instead of being dropped.
pub fn transport(config: &MqttConfig) -> (MqttPublisher, MqttConnection) {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    if let (Some(user), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(user, password);
    }

    let (client, eventloop) = AsyncClient::new(options, config.request_capacity);
    let (outbox, pending) = mpsc::unbounded_channel();

    tracing::info!(
        host = %config.host,
        port = config.port,
        client_id = %config.client_id,
        "Configured MQTT transport"
    );

    (
        MqttPublisher { outbox },
        MqttConnection {
            client,
            eventloop,
            pending,
            stalled: None,
            event_timeout: Duration::from_millis(config.event_timeout_ms),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        },
    )
}

/// A message accepted by the publisher but not yet handed to the client.
#[derive(Debug)]
struct Outgoing {
    topic: String,
    payload: Vec<u8>,
    qos: QosLevel,
}

/// Publish half: a clonable handle on the outbox.
#[derive(Clone, Debug)]
pub struct MqttPublisher {
    outbox: mpsc::UnboundedSender<Outgoing>,
}

impl PublishTransport for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QosLevel) -> Result<(), TransportError> {
        let message = Outgoing {
            topic: topic.to_string(),
            payload,
            qos,
        };
        self.outbox
            .send(message)
            .map_err(|_| TransportError::Rejected("MQTT connection closed".to_string()))
    }
}

/// Connection half: the `rumqttc` event loop and the outbox it drains.
pub struct MqttConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    pending: mpsc::UnboundedReceiver<Outgoing>,
    stalled: Option<Outgoing>,
    event_timeout: Duration,
    connect_timeout: Duration,
}

impl MqttConnection {
    /// Messages accepted by the publisher that the client has not taken yet.
    pub fn queued(&self) -> usize {
        self.pending.len() + usize::from(self.stalled.is_some())
    }

    /// Move outbox messages into the client's request queue until it is full.
    ///
    /// Returns how many were moved. Order is kept: a message the client
    /// refuses is retried first on the next call.
    fn forward(&mut self) -> usize {
        let mut moved = 0;
        loop {
            let Some(message) = self.stalled.take().or_else(|| self.pending.try_recv().ok())
            else {
                return moved;
            };

            let sent = self.client.try_publish(
                message.topic.as_str(),
                to_qos(message.qos),
                false,
                message.payload.clone(),
            );
            if sent.is_err() {
                self.stalled = Some(message);
                tracing::debug!(queued = self.queued(), "MQTT request queue full");
                return moved;
            }
            moved += 1;
        }
    }
}

impl ConnectionDriver for MqttConnection {
    async fn step(&mut self) -> ConnectionEvent {
        self.forward();

        match tokio::time::timeout(self.event_timeout, self.eventloop.poll()).await {
            Err(_) => ConnectionEvent::Idle,
            Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => ConnectionEvent::Connected {
                code: return_code(ack.code),
            },
            Ok(Ok(Event::Incoming(Packet::Disconnect))) => ConnectionEvent::Disconnected {
                reason: "broker sent DISCONNECT".to_string(),
            },
            Ok(Ok(_)) => ConnectionEvent::Activity,
            Ok(Err(e)) => ConnectionEvent::Disconnected {
                reason: e.to_string(),
            },
        }
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let timeout = self.connect_timeout;
        let eventloop = &mut self.eventloop;

        // After an error the next poll re-dials the broker; its first event
        // is the CONNACK.
        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return match return_code(ack.code) {
                            0 => Ok(()),
                            code => Err(TransportError::Refused { code }),
                        };
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(TransportError::Connection(e.to_string())),
                }
            }
        };

        match tokio::time::timeout(timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

fn to_qos(level: QosLevel) -> QoS {
    match level {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Numeric MQTT 3.1.1 CONNACK return code.
fn return_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Delivery, Dispatcher};

    #[test]
    fn test_qos_mapping() {
        assert_eq!(to_qos(QosLevel::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(to_qos(QosLevel::AtLeastOnce), QoS::AtLeastOnce);
        assert_eq!(to_qos(QosLevel::ExactlyOnce), QoS::ExactlyOnce);
    }

    #[test]
    fn test_return_codes() {
        assert_eq!(return_code(ConnectReturnCode::Success), 0);
        assert_eq!(return_code(ConnectReturnCode::BadUserNamePassword), 4);
        assert_eq!(return_code(ConnectReturnCode::NotAuthorized), 5);
    }

    #[tokio::test]
    async fn test_burst_beyond_request_capacity_is_queued() {
        let config = MqttConfig {
            request_capacity: 4,
            ..MqttConfig::default()
        };
        let (publisher, mut connection) = transport(&config);
        let mut dispatcher = Dispatcher::new(Box::new(publisher), QosLevel::AtLeastOnce);

        for count in 6..=305u64 {
            let delivery =
                dispatcher.publish("counter/press01", &serde_json::json!({ "count": count }));
            assert_eq!(delivery, Delivery::Accepted);
        }
        assert_eq!(dispatcher.stats().failed, 0);
        assert_eq!(connection.queued(), 300);

        // The event loop is never polled, so the client takes only its capacity
        // and the rest stays queued in order.
        assert_eq!(connection.forward(), 4);
        assert_eq!(connection.forward(), 0);
        assert_eq!(connection.queued(), 296);
        assert!(connection.stalled.is_some());
    }

    #[tokio::test]
    async fn test_forward_keeps_publish_order() {
        let config = MqttConfig {
            request_capacity: 1,
            ..MqttConfig::default()
        };
        let (publisher, mut connection) = transport(&config);

        for topic in ["ping/a", "ping/b", "ping/c"] {
            publisher
                .publish(topic, b"{}".to_vec(), QosLevel::AtMostOnce)
                .unwrap();
        }

        assert_eq!(connection.forward(), 1);
        assert_eq!(connection.stalled.as_ref().map(|m| m.topic.as_str()), Some("ping/b"));
        assert_eq!(connection.queued(), 2);
    }

    #[tokio::test]
    async fn test_publish_rejected_once_connection_is_gone() {
        let (publisher, connection) = transport(&MqttConfig::default());
        drop(connection);

        let result = publisher.publish("ping/plc01", b"{}".to_vec(), QosLevel::AtLeastOnce);
        assert!(matches!(result, Err(TransportError::Rejected(_))));
    }
}
