//! seq-mailgun: render Seq log events and deliver them as email through Mailgun.

pub mod clef;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod host;
pub mod metrics;
pub mod payload;
pub mod projection;
pub mod reactor;
pub mod template;

// Re-export commonly used types
pub use cli::LogFormat;
pub use dispatch::{DispatchResponse, EmailMessage, EmailSender, MailgunSender, Region};
pub use event::{HostContext, LogEvent, PropertyValue, Scalar};
pub use host::{DeliveryStats, run_event_loop};
pub use metrics::{MetricsServer, register_metric_descriptions};
pub use payload::{Payload, PayloadBuilder};
pub use reactor::{MailReactor, ReactorSettings, RenderedEmail};
pub use template::{CompiledTemplate, HelperRegistry, TemplateEngine, TemplateKind, TemplateSources};
