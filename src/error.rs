//! Centralized error types for seq-mailgun using thiserror.
//!
//! Every failure in the rendering pipeline surfaces as one of these types and
//! propagates to the caller; nothing is logged and swallowed inside the core.

use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("required setting '{0}' is blank")]
    MissingSetting(&'static str),
    #[error("invalid {template} template: {message}")]
    InvalidTemplate { template: String, message: String },
}

/// Malformed template source, reported at compile time.
///
/// Cloneable because a failed compile is cached and handed to every caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{template} template failed to compile{}: {message}", position_suffix(.position))]
pub struct TemplateCompileError {
    /// Which configured template failed (subject, body, additional info).
    pub template: String,
    /// The offending template source.
    pub source_text: String,
    /// Line and column of the parse failure, when the parser reports one.
    pub position: Option<(usize, usize)>,
    pub message: String,
}

fn position_suffix(position: &Option<(usize, usize)>) -> String {
    match position {
        Some((line, column)) => format!(" at line {}, column {}", line, column),
        None => String::new(),
    }
}

/// Errors related to template compilation and rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error(transparent)]
    Compile(#[from] TemplateCompileError),
    #[error("{template} template render failed: {message}")]
    RenderFailed { template: String, message: String },
}

/// Errors reported by the email provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The provider rejected the send; the text is the joined provider messages.
    #[error("{0}")]
    Rejected(String),
}

/// Errors related to decoding an inbound CLEF event line.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("event must be a JSON object")]
    NotAnObject,
    #[error("missing @t timestamp")]
    MissingTimestamp,
    #[error("invalid @t timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("invalid @i event type '{0}'")]
    InvalidEventType(String),
}

/// Errors raised while handling one event.
#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
