//! Email templating engine powered by Handlebars.
//!
//! Each configured template (subject, body, additional info) is compiled
//! lazily, at most once for the lifetime of the process, and the compiled
//! form is reused for every event. Helpers come from an explicit
//! [`HelperRegistry`] built once at startup and shared by all templates.
//!
//! # Architecture
//!
//! ```text
//! payload.rs → template.rs → reactor.rs → dispatch/
//! ```
//!
//! # Example
//!
//! ```ignore
//! use seq_mailgun::template::{HelperRegistry, TemplateEngine, TemplateSources};
//! use std::sync::Arc;
//!
//! let helpers = Arc::new(HelperRegistry::new());
//! let engine = TemplateEngine::new(&TemplateSources::default(), helpers);
//! let subject = engine.render_subject(&payload)?;
//! ```

use crate::error::{TemplateCompileError, TemplateError};
use crate::payload::Payload;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, RenderErrorReason,
    ScopedJson, Template,
};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

/// Subject used when none is configured.
pub const DEFAULT_SUBJECT_TEMPLATE: &str = "[{{$Level}}] {{{$Message}}} (via Seq)";

/// Body used when none is configured; ships inside the binary.
pub const DEFAULT_BODY_TEMPLATE: &str = include_str!("../templates/default-body.html.hbs");

/// Format used by the `datetime` helper when none is given.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The templates a reactor renders for each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Subject,
    Body,
    AdditionalInfo,
}

impl TemplateKind {
    pub fn name(self) -> &'static str {
        match self {
            TemplateKind::Subject => "subject",
            TemplateKind::Body => "body",
            TemplateKind::AdditionalInfo => "additional_info",
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw template sources. Blank values fall back to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSources {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub additional_info: Option<String>,
}

impl TemplateSources {
    fn non_blank(source: &Option<String>) -> Option<&str> {
        source.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Effective subject source.
    pub fn subject_source(&self) -> &str {
        Self::non_blank(&self.subject).unwrap_or(DEFAULT_SUBJECT_TEMPLATE)
    }

    /// Effective body source.
    pub fn body_source(&self) -> &str {
        Self::non_blank(&self.body).unwrap_or(DEFAULT_BODY_TEMPLATE)
    }

    /// Additional-info source, if one is configured.
    pub fn additional_info_source(&self) -> Option<&str> {
        Self::non_blank(&self.additional_info)
    }
}

/// Helpers available to every compiled template.
///
/// Construct once during startup, register any extra helpers, then share it
/// behind an `Arc`. Templates compiled afterwards see every helper registered
/// here.
pub struct HelperRegistry {
    handlebars: Handlebars<'static>,
    helper_names: Vec<String>,
}

impl HelperRegistry {
    /// Registry with the built-in `datetime`, `pretty` and `substring` helpers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_helper("datetime", Box::new(DatetimeHelper));
        registry.register_helper("pretty", Box::new(PrettyHelper));
        registry.register_helper("substring", Box::new(SubstringHelper));
        registry
    }

    /// Registry with only the Handlebars built-ins (`if`, `each`, `eq`, ...).
    pub fn empty() -> Self {
        let mut handlebars = Handlebars::new();
        // Missing payload fields render as empty strings.
        handlebars.set_strict_mode(false);
        Self {
            handlebars,
            helper_names: Vec::new(),
        }
    }

    pub fn register_helper(&mut self, name: &str, helper: Box<dyn HelperDef + Send + Sync>) {
        self.handlebars.register_helper(name, helper);
        if !self.helper_names.iter().any(|n| n == name) {
            self.helper_names.push(name.to_string());
        }
    }

    /// Names of the helpers registered on top of the Handlebars built-ins.
    pub fn helper_names(&self) -> &[String] {
        &self.helper_names
    }

    fn handlebars(&self) -> &Handlebars<'static> {
        &self.handlebars
    }
}

impl Default for HelperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperRegistry")
            .field("helpers", &self.helper_names)
            .finish()
    }
}

/// A template source plus its lazily compiled form.
///
/// The first call to [`compile`](Self::compile) or [`render`](Self::render)
/// compiles the source; concurrent first callers wait for that single
/// compilation. A failed compile is cached too, so the same
/// [`TemplateCompileError`] is returned on every later call.
pub struct CompiledTemplate {
    kind: TemplateKind,
    source: String,
    helpers: Arc<HelperRegistry>,
    compiled: OnceLock<Result<Handlebars<'static>, TemplateCompileError>>,
}

impl CompiledTemplate {
    pub fn new(
        kind: TemplateKind,
        source: impl Into<String>,
        helpers: Arc<HelperRegistry>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            helpers,
            compiled: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether compilation has already run (successfully or not).
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Compile on first use and return the cached result afterwards.
    pub fn compile(&self) -> Result<&Handlebars<'static>, TemplateCompileError> {
        self.compiled
            .get_or_init(|| {
                tracing::trace!(template = %self.kind, "Compiling template");
                let template = match Template::compile(&self.source) {
                    Ok(template) => template,
                    Err(e) => {
                        return Err(TemplateCompileError {
                            template: self.kind.name().to_string(),
                            source_text: self.source.clone(),
                            position: e.pos(),
                            message: e.reason().to_string(),
                        });
                    }
                };
                let mut registry = self.helpers.handlebars().clone();
                registry.register_template(self.kind.name(), template);
                Ok(registry)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Render the template against a payload.
    pub fn render(&self, payload: &Payload) -> Result<String, TemplateError> {
        let registry = self.compile()?;
        registry
            .render(self.kind.name(), payload)
            .map_err(|e| TemplateError::RenderFailed {
                template: self.kind.name().to_string(),
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("kind", &self.kind)
            .field("source_len", &self.source.len())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

/// The subject, body and optional additional-info templates of one reactor.
#[derive(Debug)]
pub struct TemplateEngine {
    subject: CompiledTemplate,
    body: CompiledTemplate,
    additional_info: Option<CompiledTemplate>,
}

impl TemplateEngine {
    /// Create the engine; nothing is compiled until first use.
    pub fn new(sources: &TemplateSources, helpers: Arc<HelperRegistry>) -> Self {
        Self {
            subject: CompiledTemplate::new(
                TemplateKind::Subject,
                sources.subject_source(),
                helpers.clone(),
            ),
            body: CompiledTemplate::new(TemplateKind::Body, sources.body_source(), helpers.clone()),
            additional_info: sources
                .additional_info_source()
                .map(|source| CompiledTemplate::new(TemplateKind::AdditionalInfo, source, helpers)),
        }
    }

    /// Compile every template now instead of on first event.
    pub fn compile_all(&self) -> Result<(), TemplateCompileError> {
        self.subject.compile()?;
        self.body.compile()?;
        if let Some(info) = &self.additional_info {
            info.compile()?;
        }
        Ok(())
    }

    pub fn template(&self, kind: TemplateKind) -> Option<&CompiledTemplate> {
        match kind {
            TemplateKind::Subject => Some(&self.subject),
            TemplateKind::Body => Some(&self.body),
            TemplateKind::AdditionalInfo => self.additional_info.as_ref(),
        }
    }

    pub fn has_additional_info(&self) -> bool {
        self.additional_info.is_some()
    }

    pub fn render_subject(&self, payload: &Payload) -> Result<String, TemplateError> {
        self.subject.render(payload)
    }

    pub fn render_body(&self, payload: &Payload) -> Result<String, TemplateError> {
        self.body.render(payload)
    }

    /// Render the additional-info template, or the empty string when none is configured.
    pub fn render_additional_info(&self, payload: &Payload) -> Result<String, TemplateError> {
        match &self.additional_info {
            Some(template) => template.render(payload),
            None => Ok(String::new()),
        }
    }
}

// =============================================================================
// Built-in helpers
// =============================================================================

/// Format an RFC 3339 timestamp in the given strftime format and IANA zone.
pub fn format_timestamp(raw: &str, format: &str, timezone: &str) -> Result<String, String> {
    let instant = chrono::DateTime::parse_from_rfc3339(raw)
        .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))?;
    let tz: chrono_tz::Tz = timezone
        .parse()
        .map_err(|_| format!("unknown timezone '{}'", timezone))?;

    let mut formatted = String::new();
    write!(formatted, "{}", instant.with_timezone(&tz).format(format))
        .map_err(|_| format!("invalid datetime format '{}'", format))?;
    Ok(formatted)
}

fn string_param<'a>(h: &'a Helper<'_>, index: usize) -> Option<&'a str> {
    h.param(index).and_then(|p| p.value().as_str())
}

/// `{{datetime value [format] [timezone]}}`
struct DatetimeHelper;

impl HelperDef for DatetimeHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let value = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("datetime", 0))?
            .value();
        let raw = match value {
            Value::Null => return Ok(ScopedJson::Derived(Value::String(String::new()))),
            Value::String(s) => s.as_str(),
            _ => return Err(RenderErrorReason::InvalidParamType("string").into()),
        };
        let format = string_param(h, 1).unwrap_or(DEFAULT_DATETIME_FORMAT);
        let timezone = string_param(h, 2).unwrap_or("UTC");

        let formatted = format_timestamp(raw, format, timezone)
            .map_err(RenderErrorReason::Other)?;
        Ok(ScopedJson::Derived(Value::String(formatted)))
    }
}

/// `{{pretty value}}`: strings verbatim, everything else as indented JSON.
struct PrettyHelper;

impl HelperDef for PrettyHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let value = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("pretty", 0))?
            .value();
        let text = match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other)
                .map_err(|e| RenderErrorReason::Other(e.to_string()))?,
        };
        Ok(ScopedJson::Derived(Value::String(text)))
    }
}

/// `{{substring value start [length]}}`, counted in characters.
struct SubstringHelper;

impl HelperDef for SubstringHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let value = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("substring", 0))?
            .value();
        let text = match value {
            Value::Null => "",
            Value::String(s) => s.as_str(),
            _ => return Err(RenderErrorReason::InvalidParamType("string").into()),
        };
        let start = h
            .param(1)
            .and_then(|p| p.value().as_u64())
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("substring", 1))?;
        let length = h.param(2).and_then(|p| p.value().as_u64());

        let chars = text.chars().skip(start as usize);
        let result: String = match length {
            Some(len) => chars.take(len as usize).collect(),
            None => chars.collect(),
        };
        Ok(ScopedJson::Derived(Value::String(result)))
    }
}
