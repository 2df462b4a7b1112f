//! End-to-end polling scenarios: devices, tags and the scheduler loop driven
//! by a simulated controller, broker client and broker connection.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use prodmon_bridge_framework::{
    ConnectionDriver, ConnectionEvent, ConnectionSupervisor, Dispatcher, PublishTransport,
    QosLevel, ReconnectPolicy, Scheduler, SchedulerExit, TagValue, TransportError,
    shutdown_channel,
};
use prodmon_bridge_plc::{
    CounterTag, DataTag, Device, PartSource, PingTag, ReadError, Tag, TagReader, TagReading,
};

/// Controller whose register values the test sets between ticks.
#[derive(Clone, Default)]
struct Plant {
    values: Arc<Mutex<HashMap<String, TagValue>>>,
    offline: Arc<Mutex<bool>>,
}

impl Plant {
    fn set(&self, address: &str, value: impl Into<TagValue>) {
        self.values
            .lock()
            .unwrap()
            .insert(address.to_string(), value.into());
    }

    fn go_offline(&self) {
        *self.offline.lock().unwrap() = true;
    }

    fn go_online(&self) {
        *self.offline.lock().unwrap() = false;
    }
}

impl TagReader for Plant {
    async fn read(&mut self, addresses: &[&str]) -> Result<Vec<TagReading>, ReadError> {
        if *self.offline.lock().unwrap() {
            return Err(ReadError::Connection("no route to host".into()));
        }

        let values = self.values.lock().unwrap();
        addresses
            .iter()
            .map(|address| {
                values
                    .get(*address)
                    .cloned()
                    .map(|value| TagReading::new(*address, value))
                    .ok_or_else(|| ReadError::Read(format!("no value at {}", address)))
            })
            .collect()
    }
}

/// Broker client that records every accepted message.
#[derive(Clone, Default)]
struct Broker {
    sent: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

impl Broker {
    fn take(&self) -> Vec<(String, serde_json::Value)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl PublishTransport for Broker {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        _qos: QosLevel,
    ) -> Result<(), TransportError> {
        let value = serde_json::from_slice(&payload).unwrap();
        self.sent.lock().unwrap().push((topic.to_string(), value));
        Ok(())
    }
}

/// Broker connection replaying scripted events and reconnect outcomes.
#[derive(Default)]
struct Link {
    events: VecDeque<ConnectionEvent>,
    reconnects: VecDeque<bool>,
    attempts: Arc<Mutex<u32>>,
}

impl ConnectionDriver for Link {
    async fn step(&mut self) -> ConnectionEvent {
        self.events.pop_front().unwrap_or(ConnectionEvent::Idle)
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        *self.attempts.lock().unwrap() += 1;
        match self.reconnects.pop_front() {
            Some(true) => Ok(()),
            _ => Err(TransportError::Connection("connection refused".into())),
        }
    }
}

fn press(plant: &Plant) -> Device<Plant> {
    let tags = vec![
        Tag::Ping(PingTag::new("press01-ping", "coil:0", Duration::from_secs(60))),
        Tag::Counter(CounterTag::new(
            "holding:0:u32",
            1,
            "press01",
            PartSource::Text {
                address: "holding:2".into(),
            },
            Duration::from_secs(1),
        )),
        Tag::Data(DataTag::new("temperature", "input:4", Duration::from_secs(1))),
    ];
    Device::new("press01", plant.clone(), tags)
}

type PlantScheduler = Scheduler<Device<Plant>, Link>;

fn scheduler(devices: Vec<Device<Plant>>, link: Link) -> (PlantScheduler, Broker) {
    let broker = Broker::default();
    let dispatcher = Dispatcher::new(Box::new(broker.clone()), QosLevel::AtLeastOnce);
    let supervisor = ConnectionSupervisor::new(ReconnectPolicy::default());
    (Scheduler::new(devices, dispatcher, link, supervisor), broker)
}

fn counter(tag: &Tag) -> &CounterTag {
    match tag {
        Tag::Counter(counter) => counter,
        other => panic!("Expected counter, got {}", other.kind()),
    }
}

fn data(tag: &Tag) -> &DataTag {
    match tag {
        Tag::Data(data) => data,
        other => panic!("Expected data, got {}", other.kind()),
    }
}

#[tokio::test(start_paused = true)]
async fn test_counter_baseline_then_increments() {
    let plant = Plant::default();
    plant.set("coil:0", true);
    plant.set("holding:0:u32", 5i64);
    plant.set("holding:2", "A");
    plant.set("input:4", 21.5);
    let (mut scheduler, broker) = scheduler(vec![press(&plant)], Link::default());

    // First pass: counter only records its baseline.
    assert_eq!(scheduler.tick().await, None);
    let sent = broker.take();
    let topics: Vec<&str> = sent.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        topics,
        vec!["ping/press01-ping", "data/press01/input:4/temperature/"]
    );
    assert_eq!(sent[0].1["name"], "press01");
    assert_eq!(counter(&scheduler.targets()[0].tags()[1]).last_count(), Some(5));

    // Three new units arrive before the next poll.
    plant.set("holding:0:u32", 8i64);
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(scheduler.tick().await, None);

    let sent = broker.take();
    assert_eq!(sent.len(), 3);
    for (i, (topic, payload)) in sent.iter().enumerate() {
        assert_eq!(topic, "counter/press01");
        assert_eq!(payload["asset"], "press01");
        assert_eq!(payload["part"], "A");
        assert_eq!(payload["count"], 1);
        assert_eq!(payload["perpetualcount"], 6 + i as u64);
    }
    assert_eq!(counter(&scheduler.targets()[0].tags()[1]).last_count(), Some(8));
}

#[tokio::test(start_paused = true)]
async fn test_data_value_published_once() {
    let plant = Plant::default();
    plant.set("input:7", 42i64);
    let device = Device::new(
        "oven02",
        plant.clone(),
        vec![Tag::Data(DataTag::new("setpoint", "input:7", Duration::from_secs(1)))],
    );
    let (mut scheduler, broker) = scheduler(vec![device], Link::default());

    scheduler.tick().await;
    tokio::time::advance(Duration::from_secs(1)).await;
    scheduler.tick().await;

    let sent = broker.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "data/oven02/input:7/setpoint/");
    assert_eq!(
        sent[0].1,
        serde_json::json!({ "data": 42, "tag": "input:7" })
    );
}

#[tokio::test(start_paused = true)]
async fn test_read_errors_leave_every_tag_untouched() {
    let plant = Plant::default();
    plant.go_offline();
    let (mut scheduler, broker) = scheduler(vec![press(&plant)], Link::default());

    for _ in 0..3 {
        assert_eq!(scheduler.tick().await, None);
        tokio::time::advance(Duration::from_secs(1)).await;
    }

    assert!(broker.take().is_empty());
    let tags = scheduler.targets()[0].tags();
    assert_eq!(counter(&tags[1]).last_count(), None);
    assert_eq!(data(&tags[2]).last(), None);
}

#[tokio::test(start_paused = true)]
async fn test_read_errors_keep_established_state() {
    let plant = Plant::default();
    plant.set("coil:0", true);
    plant.set("holding:0:u32", 5i64);
    plant.set("holding:2", "A");
    plant.set("input:4", 21.5);
    let (mut scheduler, broker) = scheduler(vec![press(&plant)], Link::default());

    assert_eq!(scheduler.tick().await, None);
    assert_eq!(broker.take().len(), 2);

    // Every tag, the 60 s ping included, comes due while the controller is
    // unreachable.
    plant.go_offline();
    plant.set("holding:0:u32", 9i64);
    plant.set("input:4", 30.0);
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(scheduler.tick().await, None);

    assert!(broker.take().is_empty());
    let tags = scheduler.targets()[0].tags();
    assert_eq!(counter(&tags[1]).last_count(), Some(5));
    assert_eq!(data(&tags[2]).last(), Some(&TagValue::from(21.5)));

    // Back online: changes since the last good read are picked up.
    plant.go_online();
    plant.set("holding:0:u32", 7i64);
    plant.set("input:4", 22.0);
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(scheduler.tick().await, None);

    let sent = broker.take();
    let topics: Vec<&str> = sent.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        topics,
        vec![
            "counter/press01",
            "counter/press01",
            "data/press01/input:4/temperature/"
        ]
    );
    assert_eq!(sent[0].1["perpetualcount"], 6);
    assert_eq!(sent[1].1["perpetualcount"], 7);
    assert_eq!(sent[2].1["data"], 22.0);
    let tags = scheduler.targets()[0].tags();
    assert_eq!(counter(&tags[1]).last_count(), Some(7));
    assert_eq!(data(&tags[2]).last(), Some(&TagValue::from(22.0)));
}

#[tokio::test(start_paused = true)]
async fn test_ineligible_tags_are_skipped() {
    let plant = Plant::default();
    plant.set("coil:0", true);
    plant.set("holding:0:u32", 1i64);
    plant.set("holding:2", "A");
    plant.set("input:4", 1i64);
    let (mut scheduler, broker) = scheduler(vec![press(&plant)], Link::default());

    scheduler.tick().await;
    broker.take();

    // The loop free-runs; nothing is due until time moves.
    for _ in 0..100 {
        scheduler.tick().await;
    }
    assert!(broker.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_devices_polled_in_configuration_order() {
    let first = Plant::default();
    first.set("coil:0", true);
    let second = Plant::default();
    second.set("coil:0", true);

    let ping = |device: &str, plant: &Plant| {
        Device::new(
            device,
            plant.clone(),
            vec![Tag::Ping(PingTag::new(device, "coil:0", Duration::from_secs(5)))],
        )
    };
    let (mut scheduler, broker) = scheduler(
        vec![ping("line1", &first), ping("line2", &second)],
        Link::default(),
    );

    scheduler.tick().await;

    let topics: Vec<String> = broker.take().into_iter().map(|(t, _)| t).collect();
    assert_eq!(topics, vec!["ping/line1", "ping/line2"]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_on_third_attempt_keeps_polling() {
    let plant = Plant::default();
    plant.set("coil:0", true);
    plant.set("holding:0:u32", 1i64);
    plant.set("holding:2", "A");
    plant.set("input:4", 1i64);

    let attempts = Arc::new(Mutex::new(0));
    let link = Link {
        events: VecDeque::from([ConnectionEvent::Disconnected {
            reason: "connection reset by peer".into(),
        }]),
        reconnects: VecDeque::from([false, false, true]),
        attempts: attempts.clone(),
    };
    let (mut scheduler, broker) = scheduler(vec![press(&plant)], link);

    let started = tokio::time::Instant::now();
    assert_eq!(scheduler.tick().await, None);

    // Backoff waited 1 + 2 + 4 seconds before the successful attempt.
    assert_eq!(*attempts.lock().unwrap(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(7));

    broker.take();
    plant.set("input:4", 2i64);
    assert_eq!(scheduler.tick().await, None);
    assert_eq!(broker.take().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_exhaustion_stops_the_loop() {
    let plant = Plant::default();
    plant.set("coil:0", true);

    let attempts = Arc::new(Mutex::new(0));
    let link = Link {
        events: VecDeque::from([ConnectionEvent::Disconnected {
            reason: "connection reset by peer".into(),
        }]),
        reconnects: VecDeque::new(),
        attempts: attempts.clone(),
    };
    let device = Device::new(
        "line1",
        plant.clone(),
        vec![Tag::Ping(PingTag::new("line1", "coil:0", Duration::from_secs(1)))],
    );
    let (mut scheduler, broker) = scheduler(vec![device], link);
    let (_trigger, signal) = shutdown_channel();

    let exit = scheduler.run(&signal).await;

    assert_eq!(exit, SchedulerExit::ReconnectExhausted { attempts: 12 });
    assert_eq!(*attempts.lock().unwrap(), 12);
    // Only the tick before the disconnect published anything.
    assert_eq!(broker.take().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_connack_does_not_stop_polling() {
    let plant = Plant::default();
    plant.set("coil:0", true);
    let link = Link {
        events: VecDeque::from([ConnectionEvent::Connected { code: 5 }]),
        ..Link::default()
    };
    let device = Device::new(
        "line1",
        plant.clone(),
        vec![Tag::Ping(PingTag::new("line1", "coil:0", Duration::from_secs(1)))],
    );
    let (mut scheduler, broker) = scheduler(vec![device], link);

    assert_eq!(scheduler.tick().await, None);
    assert_eq!(broker.take().len(), 1);
}
