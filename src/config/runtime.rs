//! Runtime configuration with environment variables and template files resolved.

use super::env::resolve_env_vars;
use super::secret::SecretString;
use super::types::{Config, MailgunConfig, MetricsConfig};
use crate::dispatch::{EmailSender, MailgunSender};
use crate::error::ConfigError;
use crate::event::HostContext;
use crate::reactor::{MailReactor, ReactorSettings};
use crate::template::HelperRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration ready for `main`: secrets resolved, body file read.
#[derive(Debug)]
pub struct RuntimeConfig {
    pub mailgun: MailgunConfig,
    pub reactor: ReactorSettings,
    pub host: HostContext,
    pub metrics: MetricsConfig,
    pub config_dir: PathBuf,
}

impl RuntimeConfig {
    /// Build the Mailgun sender sharing `client`.
    pub fn build_sender(&self, client: reqwest::Client) -> Result<MailgunSender, ConfigError> {
        MailgunSender::from_config(&self.mailgun, client)
    }

    /// Build the reactor around an already constructed sender.
    pub fn build_reactor(
        &self,
        helpers: Arc<HelperRegistry>,
        sender: Arc<dyn EmailSender>,
    ) -> Result<MailReactor, ConfigError> {
        MailReactor::new(&self.reactor, self.host.clone(), helpers, sender)
    }
}

impl Config {
    /// Compile configuration into runtime-ready format.
    ///
    /// `${VAR}` references in the Mailgun domain, API key and sender are
    /// resolved here; `templates.body_file` is read relative to the
    /// directory of `config_path`.
    pub fn compile(mut self, config_path: &Path) -> Result<RuntimeConfig, ConfigError> {
        let config_dir = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        self.config_dir = config_dir.clone();

        let templates = self.template_sources()?;
        let from = resolve_env_vars(&self.from)?;

        let mut mailgun = self.mailgun;
        mailgun.domain = resolve_env_vars(&mailgun.domain)?;
        mailgun.api_key = SecretString::new(resolve_env_vars(mailgun.api_key.expose())?);

        Ok(RuntimeConfig {
            mailgun,
            reactor: ReactorSettings {
                from,
                to: self.to,
                templates,
            },
            host: self.host,
            metrics: self.metrics,
            config_dir,
        })
    }
}
