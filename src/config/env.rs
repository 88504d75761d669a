//! Environment variable substitution and template resolution.

use super::types::TemplateConfig;
use crate::error::ConfigError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Maximum size for `templates.body_file` (1MB).
const MAX_BODY_TEMPLATE_SIZE: u64 = 1024 * 1024;

static ENV_VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Resolves `${VAR_NAME}` patterns in a string.
///
/// Every undefined variable is reported in a single error.
pub fn resolve_env_vars(value: &str) -> Result<String, ConfigError> {
    let mut missing = Vec::new();

    let resolved = ENV_VAR_REGEX.replace_all(value, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        match std::env::var(var_name) {
            Ok(var_value) => var_value,
            Err(_) => {
                missing.push(var_name.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(resolved.into_owned())
    } else {
        Err(ConfigError::ValidationError(format!(
            "undefined environment variable{}: {}",
            if missing.len() > 1 { "s" } else { "" },
            missing.join(", ")
        )))
    }
}

/// Resolves the body template source.
///
/// Priority: `body_file` > `body` > None (embedded default).
/// Relative file paths are taken from `config_dir`.
pub fn resolve_body_template(
    config: &TemplateConfig,
    config_dir: &Path,
) -> Result<Option<String>, ConfigError> {
    if config.body.is_some() && config.body_file.is_some() {
        tracing::warn!("both templates.body and templates.body_file defined, using body_file");
    }

    if let Some(ref file_path) = config.body_file {
        let path = if Path::new(file_path).is_absolute() {
            PathBuf::from(file_path)
        } else {
            config_dir.join(file_path)
        };

        if !path.exists() {
            return Err(ConfigError::ValidationError(format!(
                "templates.body_file not found: {}",
                path.display()
            )));
        }

        let metadata = std::fs::metadata(&path).map_err(|e| {
            ConfigError::ValidationError(format!(
                "cannot read templates.body_file '{}': {}",
                path.display(),
                e
            ))
        })?;

        if metadata.len() > MAX_BODY_TEMPLATE_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "templates.body_file '{}' exceeds maximum size of 1MB ({} bytes)",
                path.display(),
                metadata.len()
            )));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                ConfigError::ValidationError(format!(
                    "templates.body_file '{}' must be valid UTF-8",
                    path.display()
                ))
            } else {
                ConfigError::ValidationError(format!(
                    "cannot read templates.body_file '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;

        tracing::debug!(path = %path.display(), "body template source: file");
        return Ok(Some(content));
    }

    if let Some(ref template) = config.body {
        tracing::debug!("body template source: inline");
        return Ok(Some(template.clone()));
    }

    tracing::debug!("body template source: embedded");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn templates(body: Option<&str>, body_file: Option<&str>) -> TemplateConfig {
        TemplateConfig {
            body: body.map(str::to_string),
            body_file: body_file.map(str::to_string),
            ..TemplateConfig::default()
        }
    }

    #[test]
    #[serial]
    fn resolve_env_vars_substitutes_single_variable() {
        temp_env::with_var("TEST_MAILGUN_API_KEY", Some("key-abc"), || {
            let result = resolve_env_vars("${TEST_MAILGUN_API_KEY}");
            assert_eq!(result.unwrap(), "key-abc");
        });
    }

    #[test]
    #[serial]
    fn resolve_env_vars_substitutes_multiple_variables() {
        temp_env::with_vars(
            [
                ("TEST_ALERT_USER", Some("alerts")),
                ("TEST_ALERT_DOMAIN", Some("example.com")),
            ],
            || {
                let result = resolve_env_vars("${TEST_ALERT_USER}@${TEST_ALERT_DOMAIN}");
                assert_eq!(result.unwrap(), "alerts@example.com");
            },
        );
    }

    #[test]
    fn resolve_env_vars_returns_unchanged_without_pattern() {
        let input = "seq@example.com";
        assert_eq!(resolve_env_vars(input).unwrap(), input);
    }

    #[test]
    fn resolve_env_vars_ignores_malformed_references() {
        let input = "$HOME ${} ${1ABC}";
        assert_eq!(resolve_env_vars(input).unwrap(), input);
    }

    #[test]
    #[serial]
    fn resolve_env_vars_error_lists_all_undefined_variables() {
        temp_env::with_vars(
            [("UNDEFINED_A", None::<&str>), ("UNDEFINED_B", None::<&str>)],
            || {
                let err = resolve_env_vars("${UNDEFINED_A} and ${UNDEFINED_B}").unwrap_err();
                let text = err.to_string();
                assert!(text.contains("variables"));
                assert!(text.contains("UNDEFINED_A"));
                assert!(text.contains("UNDEFINED_B"));
            },
        );
    }

    #[test]
    #[serial]
    fn resolve_env_vars_handles_empty_env_value() {
        temp_env::with_var("TEST_EMPTY_VAR", Some(""), || {
            let result = resolve_env_vars("before${TEST_EMPTY_VAR}after");
            assert_eq!(result.unwrap(), "beforeafter");
        });
    }

    #[test]
    fn resolve_body_template_inline() {
        let config = templates(Some("<p>{{$Message}}</p>"), None);
        let result = resolve_body_template(&config, Path::new("."));
        assert_eq!(result.unwrap(), Some("<p>{{$Message}}</p>".to_string()));
    }

    #[test]
    fn resolve_body_template_returns_none_for_default() {
        let result = resolve_body_template(&templates(None, None), Path::new("."));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn resolve_body_template_file_relative_to_config_dir() {
        let config = templates(Some("ignored"), Some("templates/default-body.html.hbs"));
        let config_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

        let template = resolve_body_template(&config, &config_dir)
            .unwrap()
            .unwrap();
        assert!(template.contains("<!DOCTYPE html>"));
    }

    #[test]
    fn resolve_body_template_file_not_found_fails() {
        let config = templates(None, Some("nonexistent/template.hbs"));
        let err = resolve_body_template(&config, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn resolve_body_template_rejects_oversized_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![b'a'; (MAX_BODY_TEMPLATE_SIZE + 1) as usize])
            .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let err = resolve_body_template(&templates(None, Some(&path)), Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum size"));
    }

    #[test]
    fn resolve_body_template_rejects_non_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xff, 0xfe, 0xfd]).unwrap();

        let path = file.path().to_string_lossy().to_string();
        let err = resolve_body_template(&templates(None, Some(&path)), Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }
}
