//! seq-mailgun - Send Seq events as emails through Mailgun.
//!
//! Reads CLEF events, one JSON object per line, from stdin until end of
//! input or ctrl-c. Logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use seq_mailgun::cli::{Cli, LogFormat};
use seq_mailgun::config::{Config, RuntimeConfig};
use seq_mailgun::reactor::parse_recipients;
use seq_mailgun::{HelperRegistry, MetricsServer, Region, run_event_loop};

/// Timeout of a single Mailgun request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period for runtime tasks once the event loop has stopped.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Initialize the tracing subscriber with the specified log format.
fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

fn print_summary(cli: &Cli, config: &Config) {
    let endpoint = match config.mailgun.base_url.as_deref() {
        Some(url) if !url.trim().is_empty() => url.trim_end_matches('/'),
        _ => Region::from_setting(config.mailgun.region.as_deref()).base_url(),
    };
    let custom = |t: &Option<String>| if t.is_some() { "custom" } else { "default" };

    println!("Configuration is valid: {}", cli.config.display());
    println!("  Mailgun domain: {}", config.mailgun.domain);
    println!("  Mailgun endpoint: {}", endpoint);
    println!("  Recipients: {}", parse_recipients(&config.to).len());
    println!(
        "  Templates: subject {}, body {}, additional info {}",
        custom(&config.templates.subject),
        if config.templates.body_file.is_some() {
            "file"
        } else {
            custom(&config.templates.body)
        },
        if config.templates.additional_info.is_some() {
            "set"
        } else {
            "none"
        }
    );
    println!(
        "  Metrics: {} (port {})",
        if config.metrics.enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.metrics.port
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format);

    info!(config_path = %cli.config.display(), "Loading configuration");

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %cli.config.display(), "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // Fail fast: every problem is reported before anything is sent
    info!("Validating configuration");
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Configuration validation error");
        }
        error!(
            error_count = errors.len(),
            "Configuration validation failed"
        );
        std::process::exit(1);
    }

    if cli.validate {
        print_summary(&cli, &config);
        return Ok(());
    }

    let runtime_config = config.compile(&cli.config)?;

    info!(config_path = %cli.config.display(), "seq-mailgun starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run(runtime_config));

    // The stdin reader blocks on a thread that cannot be cancelled; do not
    // wait for it after Ctrl-C.
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    result
}

/// Main async entry point.
async fn run(runtime_config: RuntimeConfig) -> Result<()> {
    let http_client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    let sender = runtime_config.build_sender(http_client)?;
    info!(
        domain = sender.domain(),
        endpoint = sender.base_url(),
        "Mailgun sender ready"
    );

    let reactor =
        runtime_config.build_reactor(Arc::new(HelperRegistry::new()), Arc::new(sender))?;
    if let Err(e) = reactor.templates().compile_all() {
        error!(error = %e, "Template compilation failed");
        return Err(e.into());
    }

    let cancel = CancellationToken::new();

    let metrics_handle = if runtime_config.metrics.enabled {
        let server = MetricsServer::new(runtime_config.metrics.port);
        let cancel_metrics = cancel.clone();
        info!(
            port = runtime_config.metrics.port,
            "Starting metrics server"
        );
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(cancel_metrics).await {
                error!(error = %e, "Metrics server error");
            }
        }))
    } else {
        info!("Metrics server disabled");
        None
    };

    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c signal");
            return;
        }
        info!("Received shutdown signal, initiating graceful shutdown");
        cancel_signal.cancel();
    });

    info!(
        recipients = reactor.recipients().len(),
        "Reading events from stdin"
    );
    let stdin = BufReader::new(tokio::io::stdin());
    let result = run_event_loop(stdin, &reactor, cancel.clone()).await;

    // End of input also stops the metrics server
    cancel.cancel();
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    match result {
        Ok(_) => {
            info!("seq-mailgun shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Failed to read events from stdin");
            Err(anyhow::anyhow!("stdin read error: {}", e))
        }
    }
}
