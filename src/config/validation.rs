//! Template validation utilities.

use crate::event::{HostContext, LogEvent};
use crate::payload::PayloadBuilder;
use crate::template::{CompiledTemplate, HelperRegistry, TemplateKind};
use handlebars::Template;
use std::sync::Arc;

/// Validates Handlebars template syntax.
pub fn validate_template_syntax(source: &str) -> Result<(), String> {
    Template::compile(source)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Validates a template by rendering it against [`LogEvent::sample`].
/// Detects runtime errors like unknown helpers or bad helper arguments.
///
/// # Errors
/// Returns an error string if the template does not compile or render.
pub fn validate_template_render(
    kind: TemplateKind,
    source: &str,
    helpers: &Arc<HelperRegistry>,
    host: &HostContext,
) -> Result<(), String> {
    let event = LogEvent::sample();
    let builder = PayloadBuilder::new(&event, host);
    let payload = match kind {
        TemplateKind::AdditionalInfo => builder.build(),
        TemplateKind::Subject | TemplateKind::Body => builder.with_additional_info("").build(),
    };

    CompiledTemplate::new(kind, source, helpers.clone())
        .render(&payload)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
