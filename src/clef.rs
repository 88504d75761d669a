//! Decoding of CLEF (compact log event format) lines into [`LogEvent`]s.
//!
//! Seq feeds out-of-process apps one JSON object per line on stdin:
//!
//! ```json
//! {"@t":"2024-01-15T10:49:35.123+01:00","@mt":"Disk full on {Mount}","@l":"Error","Mount":"/var"}
//! ```
//!
//! Reified fields carry a leading `@`. A property whose own name starts with
//! `@` is escaped as `@@`. Every other key is a property of the event.
//!
//! # Error Handling
//!
//! A malformed line is reported as [`ParseError`]; the caller logs it with
//! [`record_parse_error`] and moves on to the next line.

use crate::error::ParseError;
use crate::event::{DEFAULT_LEVEL, LogEvent, Properties, PropertyValue};
use chrono::DateTime;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// `{{`, `}}`, or a `{Name}` token with optional `@`/`$` prefix and
/// `,alignment` / `:format` suffix.
static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{[@$]?([A-Za-z0-9_][A-Za-z0-9_.\-]*)(?:[,:][^{}]*)?\}")
        .expect("Invalid regex pattern - this is a bug")
});

/// Log and count a line that could not be decoded.
pub fn record_parse_error(error: &ParseError) {
    let error_type = match error {
        ParseError::InvalidJson(_) => "invalid_json",
        ParseError::NotAnObject => "not_an_object",
        ParseError::MissingTimestamp | ParseError::InvalidTimestamp(_) => "timestamp",
        ParseError::InvalidEventType(_) => "event_type",
    };

    tracing::warn!(error = %error, "Skipping malformed event line");

    metrics::counter!(
        "seq_mailgun_events_invalid_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Decode one CLEF line.
///
/// # Errors
///
/// - `ParseError::InvalidJson` if the line is not valid JSON
/// - `ParseError::NotAnObject` if the JSON is not an object
/// - `ParseError::MissingTimestamp` / `InvalidTimestamp` for a bad `@t`
/// - `ParseError::InvalidEventType` for an `@i` that is not a 32-bit code
pub fn parse_line(line: &str) -> Result<LogEvent, ParseError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ParseError::NotAnObject);
    };
    parse_object(object)
}

fn parse_object(mut object: Map<String, Value>) -> Result<LogEvent, ParseError> {
    let timestamp = match object.remove("@t") {
        Some(Value::String(raw)) => {
            DateTime::parse_from_rfc3339(&raw).map_err(|_| ParseError::InvalidTimestamp(raw))?
        }
        Some(other) => return Err(ParseError::InvalidTimestamp(other.to_string())),
        None => return Err(ParseError::MissingTimestamp),
    };

    let level = take_string(&mut object, "@l").unwrap_or_else(|| DEFAULT_LEVEL.to_string());
    let template = take_string(&mut object, "@mt");
    let message = take_string(&mut object, "@m");
    let exception = take_string(&mut object, "@x");
    let id = take_string(&mut object, "@seqid").unwrap_or_default();
    let event_type = match object.remove("@i") {
        Some(raw) => parse_event_type(&raw)?,
        None => 0,
    };

    let mut properties = Properties::new();
    for (key, value) in object {
        if let Some(escaped) = key.strip_prefix("@@") {
            properties.insert(format!("@{}", escaped), PropertyValue::from(value));
        } else if !key.starts_with('@') {
            properties.insert(key, PropertyValue::from(value));
        }
    }

    let template = template.or_else(|| message.clone()).unwrap_or_default();
    let message = message.unwrap_or_else(|| render_message_template(&template, &properties));

    let mut event = LogEvent::new(level, message)
        .with_id(id)
        .with_timestamp(timestamp)
        .with_message_template(template)
        .with_event_type(event_type);
    if let Some(exception) = exception {
        event = event.with_exception(exception);
    }
    if !properties.is_empty() {
        event.properties = Some(properties);
    }
    Ok(event)
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// `@i` arrives either as a hex string (`"a1b2c3d4"`, optionally `0x`/`$`
/// prefixed) or as a plain number.
fn parse_event_type(raw: &Value) -> Result<u32, ParseError> {
    let invalid = || ParseError::InvalidEventType(raw.to_string());
    match raw {
        Value::String(s) => {
            let digits = s
                .trim()
                .trim_start_matches("0x")
                .trim_start_matches("0X")
                .trim_start_matches('$');
            u32::from_str_radix(digits, 16).map_err(|_| invalid())
        }
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Render a message template by substituting `{Name}` tokens with property
/// values. Unknown names are left as written.
pub fn render_message_template(template: &str, properties: &Properties) -> String {
    TOKEN_REGEX
        .replace_all(template, |caps: &Captures<'_>| {
            let whole = &caps[0];
            match whole {
                "{{" => "{".to_string(),
                "}}" => "}".to_string(),
                _ => caps
                    .get(1)
                    .and_then(|name| properties.get(name.as_str()))
                    .map(PropertyValue::display_text)
                    .unwrap_or_else(|| whole.to_string()),
            }
        })
        .into_owned()
}
