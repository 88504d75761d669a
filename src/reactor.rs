//! Per-event rendering pipeline and dispatch hand-off.
//!
//! # Architecture
//!
//! ```text
//! LogEvent ─► additional info ─► body ─► subject ─► EmailSender
//!              (payload w/o        (payload with $AdditionalInfo)
//!               $AdditionalInfo)
//! ```
//!
//! Any failure before the hand-off aborts the event; nothing is sent.

use std::sync::Arc;

use crate::dispatch::{EmailMessage, EmailSender};
use crate::error::{ConfigError, ReactorError};
use crate::event::{HostContext, LogEvent};
use crate::payload::PayloadBuilder;
use crate::template::{HelperRegistry, TemplateEngine, TemplateSources};

/// Longest subject sent, in characters.
pub const MAX_SUBJECT_LENGTH: usize = 130;

/// Static settings of one reactor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactorSettings {
    /// Sender address.
    pub from: String,
    /// Recipients, one per line.
    pub to: String,
    pub templates: TemplateSources,
}

/// Output of the rendering passes for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Split a newline-delimited recipient setting into addresses.
///
/// Lines are trimmed and empty lines dropped; order is kept and addresses
/// are not validated.
pub fn parse_recipients(to: &str) -> Vec<String> {
    to.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Subject post-processing: trim, drop line breaks, cap the length.
pub fn finalize_subject(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .take(MAX_SUBJECT_LENGTH)
        .collect()
}

/// Renders events into emails and hands them to an [`EmailSender`].
pub struct MailReactor {
    from: String,
    recipients: Vec<String>,
    host: HostContext,
    templates: TemplateEngine,
    sender: Arc<dyn EmailSender>,
}

impl MailReactor {
    /// Create a reactor. Templates are compiled on first use.
    ///
    /// # Errors
    ///
    /// * `ConfigError::MissingSetting("from")` - blank sender address
    /// * `ConfigError::MissingSetting("to")` - no non-empty recipient line
    pub fn new(
        settings: &ReactorSettings,
        host: HostContext,
        helpers: Arc<HelperRegistry>,
        sender: Arc<dyn EmailSender>,
    ) -> Result<Self, ConfigError> {
        let from = settings.from.trim();
        if from.is_empty() {
            return Err(ConfigError::MissingSetting("from"));
        }
        let recipients = parse_recipients(&settings.to);
        if recipients.is_empty() {
            return Err(ConfigError::MissingSetting("to"));
        }

        Ok(Self {
            from: from.to_string(),
            recipients,
            host,
            templates: TemplateEngine::new(&settings.templates, helpers),
            sender,
        })
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Run the three template passes for one event.
    pub fn render(&self, event: &LogEvent) -> Result<RenderedEmail, ReactorError> {
        let base = PayloadBuilder::new(event, &self.host);

        let additional_info = self.templates.render_additional_info(&base.build())?;
        let payload = base.with_additional_info(&additional_info).build();

        let body = self.templates.render_body(&payload)?;
        let subject = finalize_subject(&self.templates.render_subject(&payload)?);

        tracing::trace!(
            subject_len = subject.len(),
            body_len = body.len(),
            "Event rendered"
        );

        Ok(RenderedEmail {
            recipients: self.recipients.clone(),
            subject,
            body,
        })
    }

    /// Render the event and send it.
    ///
    /// # Errors
    ///
    /// * `ReactorError::Template` - a template failed to compile or render
    /// * `ReactorError::Dispatch` - the provider reported the send as failed
    pub async fn on_event(&self, event: &LogEvent) -> Result<(), ReactorError> {
        let rendered = self.render(event)?;
        let message = EmailMessage {
            from: self.from.clone(),
            to: rendered.recipients,
            subject: rendered.subject,
            body: rendered.body,
            is_html: true,
        };

        self.sender.send(&message).await.into_result()?;
        Ok(())
    }
}

impl std::fmt::Debug for MailReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailReactor")
            .field("from", &self.from)
            .field("recipients", &self.recipients.len())
            .field("sender", &self.sender.name())
            .field("additional_info", &self.templates.has_additional_info())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchResponse;
    use crate::error::{DispatchError, TemplateError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every message and replies with a fixed response.
    struct RecordingSender {
        response: DispatchResponse,
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl RecordingSender {
        fn new(response: DispatchResponse) -> Arc<Self> {
            Arc::new(Self {
                response,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<EmailMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, message: &EmailMessage) -> DispatchResponse {
            self.sent.lock().unwrap().push(message.clone());
            self.response.clone()
        }
    }

    fn settings(subject: Option<&str>, body: Option<&str>, info: Option<&str>) -> ReactorSettings {
        ReactorSettings {
            from: "seq@example.com".to_string(),
            to: "ops@example.com".to_string(),
            templates: TemplateSources {
                subject: subject.map(str::to_string),
                body: body.map(str::to_string),
                additional_info: info.map(str::to_string),
            },
        }
    }

    fn reactor(settings: &ReactorSettings, sender: Arc<RecordingSender>) -> MailReactor {
        MailReactor::new(
            settings,
            HostContext::new("prod", vec!["https://seq.example.com/".to_string()]),
            Arc::new(HelperRegistry::new()),
            sender,
        )
        .unwrap()
    }

    #[test]
    fn recipients_split_on_any_line_break() {
        assert_eq!(
            parse_recipients("a@x.com\r\n\r\n  b@x.com  \nc@x.com\n"),
            vec!["a@x.com", "b@x.com", "c@x.com"]
        );
        assert!(parse_recipients("\n \r\n").is_empty());
    }

    #[test]
    fn recipients_are_not_validated() {
        assert_eq!(parse_recipients("not an address"), vec!["not an address"]);
    }

    #[test]
    fn subject_truncated_to_limit() {
        let long = "x".repeat(131);
        assert_eq!(finalize_subject(&long).chars().count(), 130);

        let exact = "y".repeat(130);
        assert_eq!(finalize_subject(&exact), exact);
    }

    #[test]
    fn subject_truncation_counts_characters() {
        let long = "é".repeat(200);
        let subject = finalize_subject(&long);
        assert_eq!(subject.chars().count(), 130);
        assert_eq!(subject, "é".repeat(130));
    }

    #[test]
    fn subject_line_breaks_removed_before_truncation() {
        let raw = format!("  {}\r\n{}  ", "a".repeat(100), "b".repeat(40));
        let subject = finalize_subject(&raw);
        assert_eq!(subject, format!("{}{}", "a".repeat(100), "b".repeat(30)));
    }

    #[test]
    fn subject_processing_is_idempotent() {
        let long = "z".repeat(300);
        for raw in ["  hello\nworld ", "clean subject", long.as_str()] {
            let once = finalize_subject(raw);
            assert_eq!(finalize_subject(&once), once);
        }
    }

    #[test]
    fn new_requires_from_and_recipients() {
        let sender = RecordingSender::new(DispatchResponse::success());
        let helpers = Arc::new(HelperRegistry::new());

        let mut s = settings(None, None, None);
        s.to = "\n  \n".to_string();
        let err = MailReactor::new(&s, HostContext::default(), helpers.clone(), sender.clone())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("to")));

        let mut s = settings(None, None, None);
        s.from = " ".to_string();
        let err = MailReactor::new(&s, HostContext::default(), helpers, sender).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("from")));
    }

    #[test]
    fn recipient_order_preserved() {
        let sender = RecordingSender::new(DispatchResponse::success());
        let mut s = settings(None, None, None);
        s.to = "z@x.com\na@x.com\nm@x.com".to_string();
        let reactor = reactor(&s, sender);
        assert_eq!(reactor.recipients(), ["z@x.com", "a@x.com", "m@x.com"]);
    }

    #[test]
    fn default_subject() {
        let sender = RecordingSender::new(DispatchResponse::success());
        let reactor = reactor(&settings(None, None, None), sender);
        let event = LogEvent::new("Error", "Disk full");
        let email = reactor.render(&event).unwrap();
        assert_eq!(email.subject, "[Error] Disk full (via Seq)");
        assert!(email.body.contains("Disk full"));
    }

    #[test]
    fn blank_templates_fall_back_to_defaults() {
        let reactor = reactor(
            &settings(Some(""), Some("  \n"), Some("")),
            RecordingSender::new(DispatchResponse::success()),
        );
        let event = LogEvent::new("Warning", "Queue slow");
        let email = reactor.render(&event).unwrap();
        assert_eq!(email.subject, "[Warning] Queue slow (via Seq)");
        assert!(email.body.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn property_overrides_well_known_level() {
        let reactor = reactor(
            &settings(Some("{{$Level}}"), None, None),
            RecordingSender::new(DispatchResponse::success()),
        );
        let event = LogEvent::new("Error", "x").with_property("$Level", "override");
        assert_eq!(reactor.render(&event).unwrap().subject, "override");
    }

    #[test]
    fn additional_info_feeds_body_and_subject() {
        let reactor = reactor(
            &settings(
                Some("{{$AdditionalInfo}}: {{$Message}}"),
                Some("<p>{{{$AdditionalInfo}}}</p>"),
                Some("<b>{{Service}}</b>"),
            ),
            RecordingSender::new(DispatchResponse::success()),
        );
        let event = LogEvent::new("Error", "down").with_property("Service", "billing");
        let email = reactor.render(&event).unwrap();

        assert_eq!(email.body, "<p><b>billing</b></p>");
        assert_eq!(email.subject, "&lt;b&gt;billing&lt;/b&gt;: down");
    }

    #[test]
    fn additional_info_pass_does_not_see_itself() {
        let reactor = reactor(
            &settings(
                Some("x"),
                Some("[{{$AdditionalInfo}}]"),
                Some("({{$AdditionalInfo}})"),
            ),
            RecordingSender::new(DispatchResponse::success()),
        );
        let email = reactor.render(&LogEvent::new("Error", "x")).unwrap();
        assert_eq!(email.body, "[()]");
    }

    #[test]
    fn multiline_subject_is_flattened() {
        let reactor = reactor(
            &settings(Some("  {{{$Message}}}  "), None, None),
            RecordingSender::new(DispatchResponse::success()),
        );
        let event = LogEvent::new("Error", "line one\r\nline two");
        let email = reactor.render(&event).unwrap();
        assert_eq!(email.subject, "line oneline two");
    }

    #[test]
    fn compile_failure_is_an_error_not_empty_output() {
        let sender = RecordingSender::new(DispatchResponse::success());
        let reactor = reactor(&settings(Some("{{#if $Level}}"), None, None), sender);
        let err = reactor.render(&LogEvent::new("Error", "x")).unwrap_err();
        assert!(matches!(
            err,
            ReactorError::Template(TemplateError::Compile(_))
        ));
    }

    #[tokio::test]
    async fn on_event_sends_rendered_email() {
        let sender = RecordingSender::new(DispatchResponse::success());
        let mut s = settings(
            Some("{{$Level}}: {{{$Message}}}"),
            Some("<p>{{$Message}}</p>"),
            None,
        );
        s.to = "a@x.com\nb@x.com".to_string();
        let reactor = reactor(&s, sender.clone());

        let event = LogEvent::new("Fatal", "a & b");
        reactor.on_event(&event).await.unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            EmailMessage {
                from: "seq@example.com".to_string(),
                to: vec!["a@x.com".to_string(), "b@x.com".to_string()],
                subject: "Fatal: a & b".to_string(),
                body: "<p>a &amp; b</p>".to_string(),
                is_html: true,
            }
        );
    }

    #[tokio::test]
    async fn on_event_reports_provider_messages() {
        let sender = RecordingSender::new(DispatchResponse::failure([
            "invalid domain",
            "quota exceeded",
        ]));
        let reactor = reactor(&settings(None, None, None), sender);

        let event = LogEvent::new("Error", "x");
        let err = reactor.on_event(&event).await.unwrap_err();
        assert!(matches!(err, ReactorError::Dispatch(DispatchError::Rejected(_))));
        assert_eq!(err.to_string(), "invalid domain ; quota exceeded");
    }

    #[tokio::test]
    async fn render_failure_sends_nothing() {
        let sender = RecordingSender::new(DispatchResponse::success());
        let reactor = reactor(
            &settings(None, Some("{{datetime When}}"), None),
            sender.clone(),
        );
        let event = LogEvent::new("Error", "x").with_property("When", "not a date");

        let err = reactor.on_event(&event).await.unwrap_err();
        assert!(matches!(
            err,
            ReactorError::Template(TemplateError::RenderFailed { .. })
        ));
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn debug_output_summarises() {
        let sender = RecordingSender::new(DispatchResponse::success());
        let reactor = reactor(&settings(None, None, None), sender);
        let debug = format!("{:?}", reactor);
        assert!(debug.contains("recording"));
        assert!(debug.contains("seq@example.com"));
    }
}
