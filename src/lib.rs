//! # Latency Report Library
//!
//! Streaming aggregation of load-generation results into latency reports.
//! Records are read from one or more inputs, folded into a reporter as they
//! arrive, and rendered either once at the end of the stream or periodically
//! while it is still open.
//!
//! ## Report Types
//!
//! - **Text**: request counts, latency percentiles, byte totals, success
//!   ratio, status codes and the distinct error set
//! - **JSON**: the same metrics as one JSON document per report
//! - **Histogram**: a bucketed latency distribution rendered as a table with
//!   a bar per bucket. Buckets are either fixed or grown geometrically to fit
//!   the data
//!
//! ## Architecture Overview
//!
//! - `decoder`: JSON lines and CSV record decoders with format sniffing
//! - `histogram`: bucket layouts and the bucketed latency histogram
//! - `metrics`: summary metrics built on HDR histograms
//! - `reporter`: the reporter capability set and report renderers
//! - `stream`: the priority-ordered streaming loop and top-level run
//! - `output`: report sinks, including terminal detection for screen clearing
//! - `cli`: argument parsing and validated run configuration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use latency_report::{stream, Args, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = Args {
//!         report_type: "hist".to_string(),
//!         files: vec!["results.json".to_string()],
//!         ..Default::default()
//!     };
//!     let config = ReportConfig::from_args(&args)?;
//!
//!     let summary = stream::report(&config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     println!("Aggregated {} records", summary.records);
//!     Ok(())
//! }
//! ```

/// Command-line interface and configuration
///
/// Parses arguments with clap and validates them into a [`ReportConfig`]
/// before any input is opened.
pub mod cli;

/// Record decoders for JSON lines and CSV inputs
pub mod decoder;

pub mod error;

/// Bucketed latency histogram with fixed or geometric bucket growth
pub mod histogram;

/// Diagnostic logging setup
pub mod logging;

/// Summary metrics collection
///
/// Latency percentiles come from HDR histograms; byte totals, status codes
/// and errors are tracked alongside.
pub mod metrics;

pub mod output;

pub mod record;

/// Reporter variants and their renderers
pub mod reporter;

/// Streaming report loop
pub mod stream;

pub mod utils;

pub use cli::{Args, ReportConfig};
pub use error::{DecodeError, ReportError};
pub use histogram::{Buckets, Histogram};
pub use record::Record;
pub use reporter::{AnyReporter, ReportKind, Reporter};
pub use stream::{RunSummary, StopReason};

/// The current version of the latency report tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Lower bounds used by the histogram report when no buckets are given
    pub const AUTO_BUCKETS: [Duration; 2] = [Duration::ZERO, Duration::from_millis(1)];

    /// Growth factor used by the histogram report when no buckets are given
    pub const GROWTH_FACTOR: u32 = 2;

    /// Default report type
    pub const REPORT_TYPE: &str = "text";
}
