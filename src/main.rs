use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use futures::future::{join_all, FutureExt};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use registry_client::config::ClientConfig;
use registry_client::{HttpTransport, RateLimiter, TimeWindow};

/// Introduce-goods document sent when no document file is given.
const SAMPLE_DOCUMENT: &str = r#"{"description": { "participantInn": "1234567890" }, "doc_id": "doc123", "doc_status": "pending", "doc_type": "LP_INTRODUCE_GOODS", "importRequest": true, "owner_inn": "9876543210", "participant_inn": "1234567890", "producer_inn": "9876543210", "production_date": "2020-01-23", "production_type": "sample", "products": [ { "certificate_document": "cert123", "certificate_document_date": "2020-01-23", "certificate_document_number": "cert456", "owner_inn": "9876543210", "producer_inn": "9876543210", "production_date": "2020-01-23", "tnved_code": "tnved123", "uit_code": "uit123", "uitu_code": "uitu123" } ], "reg_date": "2020-01-23", "reg_number": "reg123"}"#;

#[derive(Debug, Parser)]
#[command(name = "registry-client", version, about = "Rate-limited registry document client")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a document to the registry
    Submit {
        /// File containing the document; the built-in sample is used if omitted
        #[arg(long)]
        document: Option<PathBuf>,

        /// Document signature
        #[arg(long, default_value = "sample_signature")]
        signature: String,

        /// Number of copies to submit concurrently
        #[arg(long, default_value_t = 1)]
        copies: usize,

        /// Override the per-window submission limit
        #[arg(long)]
        limit: Option<u32>,

        /// Override the window unit (millisecond, second, minute, hour, day)
        #[arg(long)]
        unit: Option<TimeWindow>,

        /// Override the registry endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Submit {
            document,
            signature,
            copies,
            limit,
            unit,
            endpoint,
        } => {
            if let Some(limit) = limit {
                config.limiter.limit = limit;
            }
            if let Some(unit) = unit {
                config.limiter.unit = unit;
            }
            if let Some(endpoint) = endpoint {
                config.transport.endpoint = endpoint;
            }
            config.validate()?;

            let document = match document {
                Some(path) => tokio::fs::read_to_string(&path).await?,
                None => SAMPLE_DOCUMENT.to_string(),
            };

            submit(&config, &document, &signature, copies).await
        }
    }
}

async fn submit(config: &ClientConfig, document: &str, signature: &str, copies: usize) -> anyhow::Result<()> {
    let transport = HttpTransport::from_config(&config.transport)?;
    let limiter = RateLimiter::from_config(&config.limiter, transport)?;

    info!(
        endpoint = %limiter.transport().endpoint(),
        limit = limiter.limit(),
        window = ?limiter.duration(),
        copies = copies,
        "Submitting documents"
    );

    let shutdown = shutdown_signal().shared();
    let results = join_all(
        (0..copies).map(|_| limiter.submit_or_cancel(document, signature, shutdown.clone())),
    )
    .await;

    let mut failed = 0;
    for result in results {
        match result {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => {
                warn!("Submission cancelled before admission");
                failed += 1;
            }
            Err(e) => {
                error!(error = %e, "Submission failed");
                failed += 1;
            }
        }
    }

    info!(submitted = copies - failed, failed = failed, "Done");

    if failed > 0 {
        anyhow::bail!("{} of {} submissions failed", failed, copies);
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Exit status used when a second Ctrl+C aborts in-flight submissions.
const FORCED_EXIT_CODE: i32 = 130;

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// Once this future is first polled, tokio owns SIGINT, so the first signal
/// only cancels submissions still waiting for admission. Submissions already
/// sending run until their transport timeout; a second Ctrl+C exits
/// immediately.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling waiting submissions");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling waiting submissions");
        }
    }

    tokio::spawn(async {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received second Ctrl+C, aborting in-flight submissions");
            std::process::exit(FORCED_EXIT_CODE);
        }
    });
}
