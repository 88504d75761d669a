//! Mailgun HTTP API sender.
//!
//! Sends one `POST {base}/v3/{domain}/messages` per email, authenticated with
//! HTTP basic auth (user `api`, password = API key). No retries: the first
//! outcome is the reported outcome.

use crate::config::{MailgunConfig, SecretString, resolve_env_vars};
use crate::dispatch::{DispatchResponse, EmailMessage, EmailSender};
use crate::error::ConfigError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::Instrument;

const US_BASE_URL: &str = "https://api.mailgun.net";
const EU_BASE_URL: &str = "https://api.eu.mailgun.net";

/// Mailgun region; selects the API host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Region {
    #[default]
    Usa,
    Eu,
}

impl Region {
    /// `EU` in any case selects the EU region; anything else (including
    /// absent) selects the US region.
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting {
            Some(s) if s.trim().eq_ignore_ascii_case("eu") => Region::Eu,
            _ => Region::Usa,
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Region::Usa => US_BASE_URL,
            Region::Eu => EU_BASE_URL,
        }
    }
}

/// Error body returned by the Mailgun API.
#[derive(Debug, Deserialize)]
struct MailgunErrorBody {
    message: String,
}

/// Sender backed by the Mailgun messages endpoint.
pub struct MailgunSender {
    client: reqwest::Client,
    domain: String,
    api_key: SecretString,
    base_url: String,
}

impl MailgunSender {
    pub fn new(
        domain: impl Into<String>,
        api_key: SecretString,
        region: Region,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            domain: domain.into(),
            api_key,
            base_url: region.base_url().to_string(),
        }
    }

    /// Build a sender from the `mailgun` configuration section.
    ///
    /// `${VAR}` references in the domain and API key are resolved here.
    ///
    /// # Errors
    ///
    /// * `ConfigError::MissingSetting` - blank domain or API key
    /// * `ConfigError::ValidationError` - undefined environment variable
    pub fn from_config(
        config: &MailgunConfig,
        client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let domain = resolve_env_vars(&config.domain)?;
        if domain.trim().is_empty() {
            return Err(ConfigError::MissingSetting("mailgun.domain"));
        }
        let api_key = resolve_env_vars(config.api_key.expose())?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingSetting("mailgun.api_key"));
        }

        let region = Region::from_setting(config.region.as_deref());
        let sender = Self::new(domain.trim(), SecretString::new(api_key), region, client);
        Ok(match config.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => sender.with_base_url(url),
            _ => sender,
        })
    }

    /// Override the API host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the messages endpoint.
    pub fn messages_url(&self) -> String {
        format!("{}/v3/{}/messages", self.base_url, self.domain)
    }

    fn form_fields<'a>(message: &'a EmailMessage) -> Vec<(&'static str, &'a str)> {
        let mut fields = Vec::with_capacity(message.to.len() + 3);
        fields.push(("from", message.from.as_str()));
        for recipient in &message.to {
            fields.push(("to", recipient.as_str()));
        }
        fields.push(("subject", message.subject.as_str()));
        let body_field = if message.is_html { "html" } else { "text" };
        fields.push((body_field, message.body.as_str()));
        fields
    }
}

/// Turn a non-2xx response body into a provider message.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<MailgunErrorBody>(body) {
        Ok(parsed) if !parsed.message.trim().is_empty() => parsed.message,
        _ if body.trim().is_empty() => status.to_string(),
        _ => format!("{}: {}", status, body.trim()),
    }
}

#[async_trait]
impl EmailSender for MailgunSender {
    fn name(&self) -> &str {
        "mailgun"
    }

    async fn send(&self, message: &EmailMessage) -> DispatchResponse {
        let span = tracing::info_span!(
            "send_mailgun",
            domain = %self.domain,
            recipients = message.to.len()
        );

        async {
            let result = self
                .client
                .post(self.messages_url())
                .basic_auth("api", Some(self.api_key.expose()))
                .form(&Self::form_fields(message))
                .send()
                .await;

            let response = match result {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(status = %response.status(), "Mailgun accepted message");
                    metrics::counter!("seq_mailgun_emails_sent_total").increment(1);
                    return DispatchResponse::success();
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let text = error_message(status, &body);
                    tracing::warn!(status = %status, error = %text, "Mailgun rejected message");
                    DispatchResponse::failure([text])
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to reach Mailgun");
                    DispatchResponse::failure([e.to_string()])
                }
            };

            metrics::counter!("seq_mailgun_emails_failed_total").increment(1);
            response
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for MailgunSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailgunSender")
            .field("domain", &self.domain)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .finish()
    }
}
