//! Tag behaviors: liveness pings, part counters and change-detected values.
//!
//! Every tag carries its own [`Cadence`]. The next eligible poll time is
//! advanced before the read, so a slow or failing read never makes a tag
//! retry faster than configured. A failed read leaves the tag untouched.

use std::collections::HashMap;
use std::time::Duration;

use prodmon_bridge_framework::Dispatcher;
use prodmon_common::{
    CounterPayload, DataPayload, PingPayload, TagValue, counter_topic, data_topic, ping_topic,
    unix_timestamp,
};
use tokio::time::Instant;

use crate::device::DeviceHandle;
use crate::reader::TagReader;

/// Polling interval and next eligible poll time of one tag.
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: Duration,
    next_poll: Option<Instant>,
}

impl Cadence {
    /// A cadence that is due immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_poll: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// If the tag is due at `now`, schedule the next poll and return true.
    pub fn begin(&mut self, now: Instant) -> bool {
        match self.next_poll {
            Some(next) if now < next => false,
            _ => {
                self.next_poll = Some(now + self.interval);
                true
            }
        }
    }
}

/// A monitored point on a device.
#[derive(Debug, Clone)]
pub enum Tag {
    Ping(PingTag),
    Counter(CounterTag),
    Data(DataTag),
}

impl Tag {
    /// Poll the tag if its cadence is due.
    pub async fn poll<R: TagReader>(
        &mut self,
        device: &mut DeviceHandle<'_, R>,
        dispatcher: &mut Dispatcher,
        now: Instant,
    ) {
        match self {
            Tag::Ping(tag) => tag.poll(device, dispatcher, now).await,
            Tag::Counter(tag) => tag.poll(device, dispatcher, now).await,
            Tag::Data(tag) => tag.poll(device, dispatcher, now).await,
        }
    }

    /// Short name of the tag kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Tag::Ping(_) => "ping",
            Tag::Counter(_) => "counter",
            Tag::Data(_) => "data",
        }
    }
}

/// Publishes `ping/<name>` once per interval while the device answers.
#[derive(Debug, Clone)]
pub struct PingTag {
    name: String,
    address: String,
    cadence: Cadence,
}

impl PingTag {
    pub fn new(name: impl Into<String>, address: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            cadence: Cadence::new(interval),
        }
    }

    pub async fn poll<R: TagReader>(
        &mut self,
        device: &mut DeviceHandle<'_, R>,
        dispatcher: &mut Dispatcher,
        now: Instant,
    ) {
        if !self.cadence.begin(now) {
            return;
        }

        if let Err(e) = device.read(&[self.address.as_str()]).await {
            tracing::debug!(
                device = %device.name(),
                address = %self.address,
                error = %e,
                "Ping read failed"
            );
            return;
        }

        let timestamp = unix_timestamp();
        tracing::debug!(tag = %self.name, timestamp, "Create ping");

        let payload = PingPayload {
            timestamp,
            name: device.name().to_string(),
        };
        dispatcher.publish(&ping_topic(&self.name), &payload);
    }
}

/// Where a counter's part identifier comes from.
#[derive(Debug, Clone)]
pub enum PartSource {
    /// A tag holding the part number itself.
    Text { address: String },
    /// A tag holding an index resolved through `part_dict`.
    Index {
        address: String,
        part_dict: HashMap<String, String>,
    },
}

impl PartSource {
    pub fn address(&self) -> &str {
        match self {
            PartSource::Text { address } | PartSource::Index { address, .. } => address,
        }
    }

    /// Resolve the part identifier from the value read at [`address`](Self::address).
    ///
    /// An index with no mapping resolves to `None`.
    pub fn resolve(&self, value: &TagValue) -> Option<String> {
        match self {
            PartSource::Text { .. } => Some(value.to_string()),
            PartSource::Index { part_dict, .. } => part_dict.get(&value.to_string()).cloned(),
        }
    }
}

/// Last observed count of a [`CounterTag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterState {
    /// Nothing observed since startup.
    Unset,
    /// The last baseline was zero; the next reading becomes the baseline.
    RolledOver,
    /// Counting from this value.
    Counting(u64),
}

/// Publishes one `counter/<machine>` message per counted unit.
#[derive(Debug, Clone)]
pub struct CounterTag {
    address: String,
    scale: u64,
    machine: String,
    part: PartSource,
    cadence: Cadence,
    state: CounterState,
}

impl CounterTag {
    pub fn new(
        address: impl Into<String>,
        scale: u64,
        machine: impl Into<String>,
        part: PartSource,
        interval: Duration,
    ) -> Self {
        Self {
            address: address.into(),
            scale,
            machine: machine.into(),
            part,
            cadence: Cadence::new(interval),
            state: CounterState::Unset,
        }
    }

    pub fn state(&self) -> CounterState {
        self.state
    }

    /// The last observed scaled count, if any.
    pub fn last_count(&self) -> Option<u64> {
        match self.state {
            CounterState::Unset => None,
            CounterState::RolledOver => Some(0),
            CounterState::Counting(n) => Some(n),
        }
    }

    pub async fn poll<R: TagReader>(
        &mut self,
        device: &mut DeviceHandle<'_, R>,
        dispatcher: &mut Dispatcher,
        now: Instant,
    ) {
        if !self.cadence.begin(now) {
            return;
        }

        let timestamp = unix_timestamp();
        let readings = match device.read(&[self.address.as_str(), self.part.address()]).await {
            Ok(readings) => readings,
            Err(e) => {
                tracing::debug!(
                    device = %device.name(),
                    address = %self.address,
                    error = %e,
                    "Counter read failed"
                );
                return;
            }
        };

        let [count, part] = readings.as_slice() else {
            return;
        };

        let Some(raw) = count.value.as_int().and_then(|v| u64::try_from(v).ok()) else {
            tracing::debug!(
                device = %device.name(),
                address = %self.address,
                value = %count.value,
                kind = count.value.kind(),
                "Counter reading is not a non-negative integer"
            );
            return;
        };

        let Some(scaled) = raw.checked_mul(self.scale) else {
            tracing::debug!(
                device = %device.name(),
                address = %self.address,
                raw,
                "Scaled count overflows"
            );
            return;
        };

        let part = self.part.resolve(&part.value);
        self.observe(device.name(), scaled, part, timestamp, dispatcher);
    }

    /// Apply one scaled reading, emitting a message per new unit.
    fn observe(
        &mut self,
        device: &str,
        count: u64,
        part: Option<String>,
        timestamp: i64,
        dispatcher: &mut Dispatcher,
    ) {
        let last = match self.state {
            CounterState::Counting(last) => last,
            baseline => {
                let message = if baseline == CounterState::RolledOver {
                    "Counter rolled over"
                } else {
                    "First pass through"
                };
                tracing::info!(device, address = %self.address, part = ?part, count, "{}", message);
                self.state = match count {
                    0 => CounterState::RolledOver,
                    n => CounterState::Counting(n),
                };
                return;
            }
        };

        if count <= last {
            return;
        }

        let topic = counter_topic(&self.machine);
        for perpetualcount in last + 1..=count {
            tracing::debug!(machine = %self.machine, part = ?part, perpetualcount, "Create entry");
            let payload =
                CounterPayload::new(&self.machine, part.clone(), timestamp, perpetualcount);
            dispatcher.publish(&topic, &payload);
        }

        self.state = CounterState::Counting(count);
    }
}

/// Publishes a value whenever it differs from the last one seen.
///
/// Comparison is strict on the value kind: an integer never equals a float
/// or a string. A NaN float never equals itself and so publishes every poll.
#[derive(Debug, Clone)]
pub struct DataTag {
    name: String,
    address: String,
    cadence: Cadence,
    last: Option<TagValue>,
    publish_first: bool,
}

impl DataTag {
    pub fn new(name: impl Into<String>, address: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            cadence: Cadence::new(interval),
            last: None,
            publish_first: true,
        }
    }

    /// Whether the first observed value is published or only recorded.
    pub fn with_publish_first(mut self, publish_first: bool) -> Self {
        self.publish_first = publish_first;
        self
    }

    pub fn last(&self) -> Option<&TagValue> {
        self.last.as_ref()
    }

    pub async fn poll<R: TagReader>(
        &mut self,
        device: &mut DeviceHandle<'_, R>,
        dispatcher: &mut Dispatcher,
        now: Instant,
    ) {
        if !self.cadence.begin(now) {
            return;
        }

        let reading = match device.read(&[self.address.as_str()]).await {
            Ok(readings) => readings.into_iter().next(),
            Err(e) => {
                tracing::debug!(
                    device = %device.name(),
                    address = %self.address,
                    error = %e,
                    "Data read failed"
                );
                return;
            }
        };
        let Some(reading) = reading else {
            return;
        };

        let changed = match &self.last {
            None => {
                tracing::info!(
                    device = %device.name(),
                    tag = %reading.name,
                    value = %reading.value,
                    "First pass through"
                );
                self.publish_first
            }
            Some(last) => *last != reading.value,
        };

        if changed {
            tracing::info!(
                device = %device.name(),
                tag = %reading.name,
                value = %reading.value,
                "Posting data"
            );
            let payload = DataPayload {
                data: reading.value.clone(),
                tag: reading.name.clone(),
            };
            dispatcher.publish(&data_topic(device.name(), &reading.name, &self.name), &payload);
        }

        self.last = Some(reading.value);
    }
}
