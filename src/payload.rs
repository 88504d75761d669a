//! Template payload construction.
//!
//! The payload is an ordered overlay: the well-known `$`-prefixed fields are
//! written first, then every property of the event is written on top, so a
//! property named like a well-known field wins.
//!
//! ```text
//! event + host ──► well-known block ──► property overlay ──► Payload
//! ```

use crate::event::{HostContext, LogEvent};
use crate::projection::project_properties;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Value};

/// Well-known payload field names.
///
/// User templates reference these literally; they must never be renamed.
pub mod fields {
    pub const ID: &str = "$Id";
    pub const UTC_TIMESTAMP: &str = "$UtcTimestamp";
    pub const LOCAL_TIMESTAMP: &str = "$LocalTimestamp";
    pub const LEVEL: &str = "$Level";
    pub const MESSAGE_TEMPLATE: &str = "$MessageTemplate";
    pub const MESSAGE: &str = "$Message";
    pub const EXCEPTION: &str = "$Exception";
    pub const PROPERTIES: &str = "$Properties";
    pub const EVENT_TYPE: &str = "$EventType";
    pub const INSTANCE: &str = "$Instance";
    /// First host base URI, for templates expecting a scalar.
    pub const SERVER_URI: &str = "$ServerUri";
    /// All host base URIs, in order.
    pub const SERVER_URIS: &str = "$ServerUris";
    /// Output of the additional-info template (body and subject passes only).
    pub const ADDITIONAL_INFO: &str = "$AdditionalInfo";

    /// Fields present in every payload before the property overlay.
    pub const ALWAYS_PRESENT: [&str; 12] = [
        ID,
        UTC_TIMESTAMP,
        LOCAL_TIMESTAMP,
        LEVEL,
        MESSAGE_TEMPLATE,
        MESSAGE,
        EXCEPTION,
        PROPERTIES,
        EVENT_TYPE,
        INSTANCE,
        SERVER_URI,
        SERVER_URIS,
    ];
}

/// Flat field-name to value mapping handed to a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field names in write order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Last write wins.
    fn write(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }
}

/// Builds the [`Payload`] for one template pass.
#[derive(Debug, Clone, Copy)]
pub struct PayloadBuilder<'a> {
    event: &'a LogEvent,
    host: &'a HostContext,
    additional_info: Option<&'a str>,
}

impl<'a> PayloadBuilder<'a> {
    pub fn new(event: &'a LogEvent, host: &'a HostContext) -> Self {
        Self {
            event,
            host,
            additional_info: None,
        }
    }

    /// Expose a rendered additional-info string as `$AdditionalInfo`.
    pub fn with_additional_info(mut self, info: &'a str) -> Self {
        self.additional_info = Some(info);
        self
    }

    pub fn build(&self) -> Payload {
        let event = self.event;
        let properties = event
            .properties
            .as_ref()
            .map(project_properties)
            .unwrap_or_default();

        let mut payload = Payload::default();
        payload.write(fields::ID, Value::String(event.id.clone()));
        payload.write(
            fields::UTC_TIMESTAMP,
            Value::String(event.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        payload.write(
            fields::LOCAL_TIMESTAMP,
            Value::String(
                event
                    .local_timestamp
                    .to_rfc3339_opts(SecondsFormat::AutoSi, false),
            ),
        );
        payload.write(fields::LEVEL, Value::String(event.level.clone()));
        payload.write(
            fields::MESSAGE_TEMPLATE,
            Value::String(event.message_template.clone()),
        );
        payload.write(
            fields::MESSAGE,
            Value::String(event.rendered_message.clone()),
        );
        payload.write(
            fields::EXCEPTION,
            event
                .exception
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        payload.write(fields::PROPERTIES, Value::Object(properties.clone()));
        payload.write(
            fields::EVENT_TYPE,
            Value::String(format_event_type(event.event_type)),
        );
        payload.write(
            fields::INSTANCE,
            Value::String(self.host.instance_name.clone()),
        );
        payload.write(
            fields::SERVER_URI,
            Value::String(self.host.primary_server_uri().to_string()),
        );
        payload.write(
            fields::SERVER_URIS,
            Value::Array(
                self.host
                    .server_uris
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
        if let Some(info) = self.additional_info {
            payload.write(fields::ADDITIONAL_INFO, Value::String(info.to_string()));
        }

        for (name, value) in properties {
            payload.write(name, value);
        }

        payload
    }
}

/// Seq's textual event type form: `$` and eight upper-case hex digits.
pub fn format_event_type(event_type: u32) -> String {
    format!("${:08X}", event_type)
}
