//! Secret string wrapper that never appears in logs.

use serde::Deserialize;

/// Wrapper for secrets such as the Mailgun API key.
///
/// `Debug` and `Display` always print `[REDACTED]`; the value is only
/// reachable through [`expose`](Self::expose).
///
/// # Example
///
/// ```
/// use seq_mailgun::config::SecretString;
///
/// let key = SecretString::new("key-3ax6xnjp29jd6fds4gc373sgvjxteol0".to_string());
/// assert_eq!(format!("{:?}", key), "[REDACTED]");
/// assert_eq!(key.expose(), "key-3ax6xnjp29jd6fds4gc373sgvjxteol0");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: String) -> Self {
        SecretString(s)
    }

    /// Exposes the underlying secret value.
    ///
    /// Never pass the result to logging functions.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SecretString::new(s))
    }
}
