use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tsrec_engine::{
    CancellationToken, CaptureConfig, HttpConfig, Orchestrator, create_client, load_descriptors,
};

mod cli;
mod error;
mod size;

use cli::CliArgs;
use error::AppError;
use size::parse_size;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_LOG_FILTER: &str = "tsrec=info,tsrec_engine=info";

fn main() {
    if let Err(e) = bootstrap() {
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    let _log_guard = init_logging(args.verbose, args.quiet, args.log_dir.as_deref())?;

    let capture_config = CaptureConfig::default()
        .with_reconnect_delay(Duration::from_secs(args.reconnect_delay))
        .with_idle_read_delay(Duration::from_secs(args.idle_delay))
        .with_max_part_size(parse_size(&args.max_part_size)?);

    let http_config = HttpConfig {
        connect_timeout: Duration::from_secs(args.connect_timeout),
        read_timeout: args.read_timeout.map(Duration::from_secs),
        follow_redirects: !args.no_redirects,
        ..HttpConfig::default()
    };

    info!(
        reconnect_delay_s = args.reconnect_delay,
        idle_delay_s = args.idle_delay,
        max_part_size = capture_config.max_part_size,
        connect_timeout_s = args.connect_timeout,
        read_timeout_s = ?args.read_timeout,
        follow_redirects = http_config.follow_redirects,
        "Capture configuration"
    );

    let client = create_client(&http_config)?;
    let orchestrator = Orchestrator::new(client, capture_config)?;

    let descriptors = load_descriptors(&args.config).await?;
    if descriptors.is_empty() {
        warn!(path = %args.config.display(), "No streams configured, nothing to do");
        return Ok(());
    }

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(token.clone()));

    let report = orchestrator.run(descriptors, token).await;
    info!(
        playlists_completed = report.playlists_completed,
        playlists_failed = report.playlists_failed,
        playlists_cancelled = report.playlists_cancelled,
        captures_stopped = report.captures_stopped,
        tasks_panicked = report.tasks_panicked,
        "Shutdown complete"
    );
    Ok(())
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, stopping all captures...");
            token.cancel();
        }
        Err(e) => warn!(error = %e, "Unable to listen for Ctrl+C"),
    }
}

/// Console logging, plus a daily rolling file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop and must be held until exit.
fn init_logging(
    verbose: bool,
    quiet: bool,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>, AppError> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "tsrec.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(verbose))
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    Ok(guard)
}
