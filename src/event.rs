//! Log event model delivered by the host.
//!
//! A [`LogEvent`] carries the fixed Seq event fields plus an open-ended
//! property bag. Property values are a tagged variant so arbitrarily nested
//! data can be carried without reflection or dynamic typing.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Level assigned when the host does not supply one.
pub const DEFAULT_LEVEL: &str = "Information";

/// Open-ended property bag of an event.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Leaf value of a property bag.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
}

/// A property value: scalar, nested mapping, or ordered sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(Scalar),
    Mapping(Properties),
    Sequence(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Text rendering used when a property is substituted into a message template.
    pub fn display_text(&self) -> String {
        match self {
            PropertyValue::Scalar(Scalar::Null) => "null".to_string(),
            PropertyValue::Scalar(Scalar::Bool(b)) => b.to_string(),
            PropertyValue::Scalar(Scalar::Integer(i)) => i.to_string(),
            PropertyValue::Scalar(Scalar::Unsigned(u)) => u.to_string(),
            PropertyValue::Scalar(Scalar::Float(f)) => f.to_string(),
            PropertyValue::Scalar(Scalar::Text(s)) => s.clone(),
            other => crate::projection::project(other).to_string(),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Scalar(Scalar::Text(value.to_string()))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Scalar(Scalar::Text(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Scalar(Scalar::Integer(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Scalar(Scalar::Bool(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Scalar(Scalar::Float(value))
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(value: Vec<PropertyValue>) -> Self {
        PropertyValue::Sequence(value)
    }
}

impl From<Properties> for PropertyValue {
    fn from(value: Properties) -> Self {
        PropertyValue::Mapping(value)
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => PropertyValue::Scalar(Scalar::Null),
            Value::Bool(b) => PropertyValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PropertyValue::Scalar(Scalar::Integer(i))
                } else if let Some(u) = n.as_u64() {
                    PropertyValue::Scalar(Scalar::Unsigned(u))
                } else {
                    PropertyValue::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            Value::String(s) => PropertyValue::Scalar(Scalar::Text(s)),
            Value::Array(items) => {
                PropertyValue::Sequence(items.into_iter().map(PropertyValue::from).collect())
            }
            Value::Object(map) => PropertyValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, PropertyValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// A single log event as received from the host.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// The timestamp with the offset the host supplied it in.
    pub local_timestamp: DateTime<FixedOffset>,
    pub level: String,
    pub message_template: String,
    pub rendered_message: String,
    pub exception: Option<String>,
    pub event_type: u32,
    pub properties: Option<Properties>,
}

impl LogEvent {
    /// Create an event with the given level and message, timestamped now.
    ///
    /// The message doubles as the message template; use the `with_*`
    /// methods to fill in the remaining fields.
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let now = Utc::now();
        Self {
            id: String::new(),
            timestamp: now,
            local_timestamp: now.fixed_offset(),
            level: level.into(),
            message_template: message.clone(),
            rendered_message: message,
            exception: None,
            event_type: 0,
            properties: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set both timestamps from a single offset-carrying instant.
    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp.with_timezone(&Utc);
        self.local_timestamp = timestamp;
        self
    }

    pub fn with_message_template(mut self, template: impl Into<String>) -> Self {
        self.message_template = template.into();
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    pub fn with_event_type(mut self, event_type: u32) -> Self {
        self.event_type = event_type;
        self
    }

    /// Add one property, creating the bag if the event had none.
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(name.into(), value.into());
        self
    }

    /// Fixed, fully populated event used to test-render templates at startup.
    pub fn sample() -> Self {
        let timestamp = DateTime::parse_from_rfc3339("2024-01-15T10:49:35+01:00")
            .unwrap_or_else(|_| Utc::now().fixed_offset());
        LogEvent::new("Error", "Disk full on /var")
            .with_id("event-sample")
            .with_timestamp(timestamp)
            .with_message_template("Disk full on {Mount}")
            .with_exception("System.IO.IOException: No space left on device")
            .with_event_type(0xA1B2C3D4)
            .with_property("Mount", "/var")
    }
}

/// Information about the host instance that is delivering events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostContext {
    /// Display name of the host instance.
    #[serde(default)]
    pub instance_name: String,
    /// Base URIs the host is reachable at, in preference order.
    #[serde(default)]
    pub server_uris: Vec<String>,
}

impl HostContext {
    pub fn new(instance_name: impl Into<String>, server_uris: Vec<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            server_uris,
        }
    }

    /// The preferred base URI, or an empty string when none is known.
    pub fn primary_server_uri(&self) -> &str {
        self.server_uris.first().map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_value_from_json_preserves_structure() {
        let value = PropertyValue::from(json!({
            "user": {"name": "ada", "roles": ["admin", "ops"]},
            "count": 3,
            "big": 18446744073709551615u64,
            "ratio": 0.5,
            "flag": true,
            "none": null
        }));

        let PropertyValue::Mapping(map) = value else {
            panic!("expected mapping");
        };
        assert_eq!(map["count"], PropertyValue::Scalar(Scalar::Integer(3)));
        assert_eq!(
            map["big"],
            PropertyValue::Scalar(Scalar::Unsigned(u64::MAX))
        );
        assert_eq!(map["ratio"], PropertyValue::Scalar(Scalar::Float(0.5)));
        assert_eq!(map["flag"], PropertyValue::Scalar(Scalar::Bool(true)));
        assert_eq!(map["none"], PropertyValue::Scalar(Scalar::Null));

        let PropertyValue::Mapping(user) = &map["user"] else {
            panic!("expected nested mapping");
        };
        assert_eq!(
            user["roles"],
            PropertyValue::Sequence(vec!["admin".into(), "ops".into()])
        );
    }

    #[test]
    fn with_property_creates_bag() {
        let event = LogEvent::new("Warning", "hello");
        assert!(event.properties.is_none());

        let event = event
            .with_property("Host", "web-01")
            .with_property("Port", 8080i64);
        let props = event.properties.unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props["Host"], PropertyValue::from("web-01"));
    }

    #[test]
    fn with_timestamp_keeps_offset_and_utc() {
        let ts = DateTime::parse_from_rfc3339("2024-01-15T10:00:00+02:00").unwrap();
        let event = LogEvent::new("Error", "x").with_timestamp(ts);
        assert_eq!(event.timestamp.to_rfc3339(), "2024-01-15T08:00:00+00:00");
        assert_eq!(
            event.local_timestamp.to_rfc3339(),
            "2024-01-15T10:00:00+02:00"
        );
    }

    #[test]
    fn display_text_for_scalars_and_structures() {
        assert_eq!(PropertyValue::from("abc").display_text(), "abc");
        assert_eq!(PropertyValue::from(42i64).display_text(), "42");
        assert_eq!(
            PropertyValue::Sequence(vec![1i64.into(), 2i64.into()]).display_text(),
            "[1,2]"
        );
    }

    #[test]
    fn primary_server_uri_falls_back_to_empty() {
        assert_eq!(HostContext::default().primary_server_uri(), "");
        let host = HostContext::new(
            "seq",
            vec!["https://a/".to_string(), "https://b/".to_string()],
        );
        assert_eq!(host.primary_server_uri(), "https://a/");
    }
}
