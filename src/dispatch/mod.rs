//! Email dispatch boundary.
//!
//! The rendering pipeline hands a finished [`EmailMessage`] to an
//! [`EmailSender`] and reads back a [`DispatchResponse`]. The only production
//! sender is [`MailgunSender`]; tests substitute their own.

mod mailgun;

pub use mailgun::{MailgunSender, Region};

use async_trait::async_trait;

use crate::error::DispatchError;

/// Separator used when joining provider error messages.
pub const ERROR_SEPARATOR: &str = " ; ";

/// A fully rendered email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Send `body` as HTML rather than plain text.
    pub is_html: bool,
}

/// Outcome of one send as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchResponse {
    pub successful: bool,
    pub error_messages: Vec<String>,
}

impl DispatchResponse {
    pub fn success() -> Self {
        Self {
            successful: true,
            error_messages: Vec::new(),
        }
    }

    pub fn failure(messages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            successful: false,
            error_messages: messages.into_iter().map(Into::into).collect(),
        }
    }

    /// Turn an unsuccessful response into a [`DispatchError`] carrying the
    /// provider messages joined with `" ; "`.
    pub fn into_result(self) -> Result<(), DispatchError> {
        if self.successful {
            Ok(())
        } else {
            Err(DispatchError::Rejected(
                self.error_messages.join(ERROR_SEPARATOR),
            ))
        }
    }
}

/// Capability to deliver an email.
///
/// Implementations must be `Send + Sync` so one sender can be shared by the
/// event loop. Senders never retry; a failed send is reported once.
///
/// # Example
///
/// ```ignore
/// use seq_mailgun::dispatch::{DispatchResponse, EmailMessage, EmailSender};
///
/// struct Discard;
///
/// #[async_trait]
/// impl EmailSender for Discard {
///     fn name(&self) -> &str { "discard" }
///     async fn send(&self, _: &EmailMessage) -> DispatchResponse {
///         DispatchResponse::success()
///     }
/// }
/// ```
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Provider name used in logs and metrics (e.g. "mailgun").
    fn name(&self) -> &str;

    /// Deliver one message. Transport failures are reported as an
    /// unsuccessful response, never as a panic.
    async fn send(&self, message: &EmailMessage) -> DispatchResponse;
}

impl std::fmt::Debug for dyn EmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSender")
            .field("name", &self.name())
            .finish()
    }
}
