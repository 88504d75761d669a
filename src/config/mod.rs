//! Configuration loading and validation for seq-mailgun.
//!
//! This module handles loading the YAML configuration file,
//! validation, and managing environment variables for secrets.

mod env;
mod runtime;
mod secret;
mod types;
mod validation;

// Re-exports publics
pub use env::{resolve_body_template, resolve_env_vars};
pub use runtime::RuntimeConfig;
pub use secret::SecretString;
pub use types::{
    Config, DEFAULT_CONFIG_PATH, DEFAULT_METRICS_PORT, MailgunConfig, MetricsConfig,
    TemplateConfig,
};
pub use validation::{validate_template_render, validate_template_syntax};
