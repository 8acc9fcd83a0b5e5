//! # Latency Report - Main Entry Point
//!
//! Reads load-generation results from files or standard input and writes a
//! text, JSON or histogram report.
//!
//! 1. **Parse arguments**: processes command-line configuration
//! 2. **Initialize logging**: diagnostics to stderr, optionally a log file
//! 3. **Validate configuration**: rejects bad report types and buckets before
//!    any input is opened
//! 4. **Run the report**: streams records until end of input or Ctrl-C, then
//!    writes the final report
//!
//! ## Error Handling
//!
//! Any error ends the run with a non-zero exit status. A decode error means
//! no final report is written.

use anyhow::{Context, Result};
use clap::Parser;
use latency_report::{logging, stream, Args, ReportConfig};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Held until exit so the background log writer drains.
    let _log_guard = logging::init(args.verbose, args.log_file.as_deref())?;

    info!("Starting latency-report {}", latency_report::VERSION);
    debug!("Configuration: {:?}", args);

    let config = ReportConfig::from_args(&args).context("Invalid report configuration")?;

    let summary = stream::report(&config, interrupted())
        .await
        .with_context(|| format!("Failed to generate {} report", config.kind))?;

    debug!("Run finished: {:?}", summary);
    Ok(())
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Unable to listen for interrupts: {}", e);
        std::future::pending::<()>().await;
    }
}
