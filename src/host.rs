//! Host delivery loop: CLEF lines in, one email per event out.
//!
//! # Architecture
//!
//! ```text
//! stdin ─► lines ─► clef::parse_line ─► MailReactor::on_event ─► Mailgun
//!                        │                       │
//!                        └── skip + count ───────┴── log + count, continue
//! ```
//!
//! A bad line or a failed send never stops the loop; only end of input or
//! cancellation does.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::clef::{parse_line, record_parse_error};
use crate::error::ReactorError;
use crate::event::LogEvent;
use crate::reactor::MailReactor;

/// Per-run counters, returned when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub received: u64,
    pub invalid: u64,
    pub sent: u64,
    pub failed: u64,
}

/// Read events until end of input or cancellation.
///
/// # Errors
///
/// Only I/O errors on the input stream end the loop with an error.
pub async fn run_event_loop<R>(
    reader: R,
    reactor: &MailReactor,
    cancel: CancellationToken,
) -> std::io::Result<DeliveryStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = DeliveryStats::default();
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown requested, stopping event loop");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            debug!("Input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        stats.received += 1;
        metrics::counter!("seq_mailgun_events_received_total").increment(1);

        let event = match parse_line(&line) {
            Ok(event) => event,
            Err(e) => {
                stats.invalid += 1;
                record_parse_error(&e);
                continue;
            }
        };

        match reactor.on_event(&event).await {
            Ok(()) => {
                stats.sent += 1;
                info!(
                    event_id = %event.id,
                    level = %event.level,
                    recipients = reactor.recipients().len(),
                    "Email sent"
                );
            }
            Err(e) => {
                stats.failed += 1;
                record_reactor_error(&event, &e);
            }
        }
    }

    info!(
        received = stats.received,
        invalid = stats.invalid,
        sent = stats.sent,
        failed = stats.failed,
        "Event loop finished"
    );
    Ok(stats)
}

/// Log a failed event and count template failures.
pub fn record_reactor_error(event: &LogEvent, error: &ReactorError) {
    match error {
        ReactorError::Template(e) => {
            metrics::counter!("seq_mailgun_render_errors_total").increment(1);
            error!(event_id = %event.id, error = %e, "Template failed, event dropped");
        }
        ReactorError::Dispatch(e) => {
            error!(event_id = %event.id, error = %e, "Mailgun did not accept the email");
        }
    }
}
