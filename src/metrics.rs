//! Prometheus metrics exposition server.
//!
//! Exposes seq-mailgun counters in Prometheus format on a configurable port
//! when `metrics.enabled` is set.

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Global flag to track if recorder is installed (for tests)
static RECORDER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Register all metric descriptions for Prometheus.
///
/// Called once after the recorder is installed; descriptions become the
/// HELP text in the Prometheus output.
pub fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        "seq_mailgun_events_received_total",
        "Total number of event lines read from the host"
    );
    describe_counter!(
        "seq_mailgun_events_invalid_total",
        "Total number of event lines that could not be decoded"
    );
    describe_counter!(
        "seq_mailgun_emails_sent_total",
        "Total number of emails accepted by Mailgun"
    );
    describe_counter!(
        "seq_mailgun_emails_failed_total",
        "Total number of emails rejected by Mailgun or not delivered to it"
    );
    describe_counter!(
        "seq_mailgun_render_errors_total",
        "Total number of events dropped because a template failed"
    );

    describe_gauge!(
        "seq_mailgun_build_info",
        "Build information with version label (always 1)"
    );
}

/// Initialize all known metrics so they appear in `/metrics` from startup.
pub fn initialize_metrics() {
    use metrics::{counter, gauge};

    gauge!("seq_mailgun_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    counter!("seq_mailgun_events_received_total").absolute(0);
    counter!("seq_mailgun_emails_sent_total").absolute(0);
    counter!("seq_mailgun_emails_failed_total").absolute(0);
    counter!("seq_mailgun_render_errors_total").absolute(0);

    tracing::debug!("Metrics initialized to zero");
}

/// Metrics server for Prometheus exposition.
pub struct MetricsServer {
    port: u16,
    /// Signalled once the recorder is installed, so callers can wait
    /// before emitting metrics.
    ready_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MetricsServer {
    /// Create a new metrics server bound to the given port.
    ///
    /// Use port 0 to let the OS assign an available port.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ready_tx: None,
        }
    }

    /// Create a new metrics server with a ready signal channel.
    pub fn with_ready_signal(port: u16, ready_tx: tokio::sync::oneshot::Sender<()>) -> Self {
        Self {
            port,
            ready_tx: Some(ready_tx),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Install the global recorder, serve `/metrics`, and wait for cancellation.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be installed (port in use,
    /// recorder already installed).
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();

        // The recorder can only be installed once per process
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

        let _ = RECORDER_INSTALLED.set(());

        register_metric_descriptions();
        initialize_metrics();

        if let Some(tx) = self.ready_tx {
            let _ = tx.send(());
        }

        info!(port = self.port, "Metrics server started on /metrics");

        cancel.cancelled().await;

        info!("Metrics server shutting down");

        Ok(())
    }
}

/// Check if the metrics recorder has been installed.
pub fn is_recorder_installed() -> bool {
    RECORDER_INSTALLED.get().is_some()
}
