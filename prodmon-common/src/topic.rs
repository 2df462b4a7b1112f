//! Topic builders for the messages downstream consumers subscribe to.
//!
//! ```text
//! ping/<tag>
//! counter/<machine>
//! data/<device>/<source_tag>/<local_tag>/
//! ```
//!
//! These paths are a stable contract; the trailing `/` on data topics is part
//! of it.

/// Root of liveness topics.
pub const PING_ROOT: &str = "ping";

/// Root of part counter topics.
pub const COUNTER_ROOT: &str = "counter";

/// Root of value-change topics.
pub const DATA_ROOT: &str = "data";

/// Topic for a ping tag.
///
/// # Example
/// ```
/// use prodmon_common::topic::ping_topic;
///
/// assert_eq!(ping_topic("line3_plc"), "ping/line3_plc");
/// ```
pub fn ping_topic(tag: &str) -> String {
    format!("{}/{}", PING_ROOT, tag)
}

/// Topic for a part counter.
///
/// # Example
/// ```
/// use prodmon_common::topic::counter_topic;
///
/// assert_eq!(counter_topic("press01"), "counter/press01");
/// ```
pub fn counter_topic(machine: &str) -> String {
    format!("{}/{}", COUNTER_ROOT, machine)
}

/// Topic for a data tag.
///
/// # Example
/// ```
/// use prodmon_common::topic::data_topic;
///
/// assert_eq!(
///     data_topic("plc01", "holding:10", "spindle_speed"),
///     "data/plc01/holding:10/spindle_speed/"
/// );
/// ```
pub fn data_topic(device: &str, source_tag: &str, local_tag: &str) -> String {
    format!("{}/{}/{}/{}/", DATA_ROOT, device, source_tag, local_tag)
}
