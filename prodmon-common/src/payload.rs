use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar value read from a controller tag.
///
/// Equality is strict on the variant: `Int(1)` and `Float(1.0)` are different
/// values, as are `Int(0)` and `Text("0")`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TagValue {
    /// Integer register or DINT-style value.
    Int(i64),

    /// Floating point value.
    Float(f64),

    /// Boolean (coil, discrete input, BOOL tag).
    Bool(bool),

    /// Text value.
    Text(String),
}

impl TagValue {
    /// Return the integer held by this value, if it is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the variant, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            TagValue::Int(_) => "int",
            TagValue::Float(_) => "float",
            TagValue::Bool(_) => "bool",
            TagValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Int(v) => write!(f, "{}", v),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::Bool(v) => write!(f, "{}", v),
            TagValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Text(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Text(v.to_string())
    }
}

/// Liveness message published on `ping/<tag>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {
    /// Unix epoch seconds of the read.
    pub timestamp: i64,

    /// Name of the device that answered.
    pub name: String,
}

/// One counted unit, published on `counter/<machine>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterPayload {
    /// Machine label the counter belongs to.
    pub asset: String,

    /// Resolved part identifier (`null` when an index has no mapping).
    pub part: Option<String>,

    /// Unix epoch seconds of the poll.
    pub timestamp: i64,

    /// Running total this unit brings the counter to.
    pub perpetualcount: u64,

    /// Always 1: each message is a single unit.
    pub count: u32,
}

impl CounterPayload {
    /// Build the payload for a single counted unit.
    pub fn new(
        asset: impl Into<String>,
        part: Option<String>,
        timestamp: i64,
        perpetualcount: u64,
    ) -> Self {
        Self {
            asset: asset.into(),
            part,
            timestamp,
            perpetualcount,
            count: 1,
        }
    }
}

/// Value-change message published on `data/<device>/<source>/<local>/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPayload {
    /// The new value.
    pub data: TagValue,

    /// Tag name as reported by the controller.
    pub tag: String,
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_value_equality_is_strict() {
        assert_ne!(TagValue::Int(1), TagValue::Float(1.0));
        assert_ne!(TagValue::Int(0), TagValue::Text("0".to_string()));
        assert_ne!(TagValue::Text(String::new()), TagValue::Int(0));
        assert_eq!(TagValue::from("abc"), TagValue::Text("abc".to_string()));
    }

    #[test]
    fn test_tag_value_untagged_json() {
        assert_eq!(serde_json::to_string(&TagValue::Int(42)).unwrap(), "42");
        assert_eq!(
            serde_json::to_string(&TagValue::Text("run".into())).unwrap(),
            "\"run\""
        );

        let parsed: TagValue = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, TagValue::Int(42));
        let parsed: TagValue = serde_json::from_str("4.5").unwrap();
        assert_eq!(parsed, TagValue::Float(4.5));
    }

    #[test]
    fn test_tag_value_display() {
        assert_eq!(TagValue::Int(7).to_string(), "7");
        assert_eq!(TagValue::Bool(true).to_string(), "true");
        assert_eq!(TagValue::Text("P-100".into()).to_string(), "P-100");
    }

    #[test]
    fn test_counter_payload_unmapped_part_is_null() {
        let payload = CounterPayload::new("press01", None, 10, 3);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"part\":null"));
        assert!(json.contains("\"count\":1"));
    }

    #[test]
    fn test_data_payload_shape() {
        let payload = DataPayload {
            data: TagValue::Int(42),
            tag: "holding:10".to_string(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"data":42,"tag":"holding:10"}"#);
    }

    #[test]
    fn test_unix_timestamp_is_seconds() {
        let ts = unix_timestamp();
        // After 2020-01-01 and well below millisecond magnitudes.
        assert!(ts > 1_577_836_800);
        assert!(ts < 10_000_000_000);
    }
}
