//! Core configuration types and loading.

use super::env::{resolve_body_template, resolve_env_vars};
use super::secret::SecretString;
use super::validation::{validate_template_render, validate_template_syntax};
use crate::error::ConfigError;
use crate::event::HostContext;
use crate::reactor::parse_recipients;
use crate::template::{HelperRegistry, TemplateKind, TemplateSources};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/seq-mailgun/config.yaml";

/// Default port of the Prometheus exporter.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Main configuration structure for seq-mailgun.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Mailgun account settings.
    pub mailgun: MailgunConfig,
    /// Sender address.
    pub from: String,
    /// Recipients, one address per line.
    pub to: String,
    /// Optional template overrides.
    #[serde(default)]
    pub templates: TemplateConfig,
    /// Host instance details exposed to templates.
    #[serde(default)]
    pub host: HostContext,
    /// Metrics exposition configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Directory of the loaded file; relative template paths start here.
    #[serde(skip)]
    pub config_dir: PathBuf,
}

/// Mailgun account configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailgunConfig {
    /// Sending domain registered with Mailgun.
    pub domain: String,
    /// API key (never exposed in logs).
    pub api_key: SecretString,
    /// `EU` selects the EU endpoint; anything else the US endpoint.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override, e.g. for a relay or a test server.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Template overrides. Absent or blank values use the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Body template read from a file; wins over `body`.
    #[serde(default)]
    pub body_file: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

/// Metrics exposition configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics exposition is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Port to expose metrics on (default: 9090).
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_METRICS_PORT,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// # Errors
    /// Returns [`ConfigError::LoadError`] if the file cannot be read.
    /// Returns [`ConfigError::ValidationError`] if the YAML is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        config.config_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        Ok(config)
    }

    /// Template sources with the body file (if any) already read.
    pub fn template_sources(&self) -> Result<TemplateSources, ConfigError> {
        Ok(TemplateSources {
            subject: self.templates.subject.clone(),
            body: resolve_body_template(&self.templates, &self.config_dir)?,
            additional_info: self.templates.additional_info.clone(),
        })
    }

    /// Validate the whole configuration, collecting every error.
    ///
    /// Templates are syntax-checked, then test-rendered against a sample
    /// event so unknown helpers are caught at startup.
    ///
    /// # Errors
    /// Returns a `Vec<ConfigError>` containing all validation errors found.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.mailgun.domain.trim().is_empty() {
            errors.push(ConfigError::MissingSetting("mailgun.domain"));
        }
        if self.mailgun.api_key.is_blank() {
            errors.push(ConfigError::MissingSetting("mailgun.api_key"));
        }
        if self.from.trim().is_empty() {
            errors.push(ConfigError::MissingSetting("from"));
        }
        if parse_recipients(&self.to).is_empty() {
            errors.push(ConfigError::MissingSetting("to"));
        }

        for (setting, value) in [
            ("mailgun.domain", self.mailgun.domain.as_str()),
            ("mailgun.api_key", self.mailgun.api_key.expose()),
            ("from", self.from.as_str()),
        ] {
            if let Err(e) = resolve_env_vars(value) {
                let message = match e {
                    ConfigError::ValidationError(message) => message,
                    other => other.to_string(),
                };
                errors.push(ConfigError::ValidationError(format!("{}: {}", setting, message)));
            }
        }

        if let Some(ref url) = self.mailgun.base_url
            && !url.trim().is_empty()
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            errors.push(ConfigError::ValidationError(format!(
                "mailgun.base_url '{}' must start with http:// or https://",
                url
            )));
        }

        match self.template_sources() {
            Ok(sources) => self.validate_templates(&sources, &mut errors),
            Err(e) => errors.push(e),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_templates(&self, sources: &TemplateSources, errors: &mut Vec<ConfigError>) {
        let helpers = Arc::new(HelperRegistry::new());
        let configured = [
            (TemplateKind::Subject, Some(sources.subject_source())),
            (TemplateKind::Body, Some(sources.body_source())),
            (TemplateKind::AdditionalInfo, sources.additional_info_source()),
        ];

        for (kind, source) in configured {
            let Some(source) = source else { continue };

            if let Err(e) = validate_template_syntax(source) {
                errors.push(ConfigError::InvalidTemplate {
                    template: kind.name().to_string(),
                    message: e,
                });
                continue;
            }
            if let Err(e) = validate_template_render(kind, source, &helpers, &self.host) {
                errors.push(ConfigError::InvalidTemplate {
                    template: kind.name().to_string(),
                    message: format!("render: {}", e),
                });
            }
        }
    }
}
