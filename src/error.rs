//! Error types shared by the aggregation engine and its collaborators.
//!
//! Every failure is terminal for the run that produced it. Configuration
//! problems surface before any input is read, decode failures abort the run
//! without a final report, and write failures abort wherever they happen.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while running a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Histogram bucket specification is not a bracketed duration list
    #[error("bad buckets: {0}")]
    InvalidBuckets(String),

    /// A duration literal could not be parsed
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("unknown report type: {0:?}")]
    UnknownReportType(String),

    #[error("the {0} report type has been deprecated and is no longer supported")]
    DeprecatedReportType(String),

    /// Growth factor of 1 would never extend the bucket range
    #[error("invalid histogram growth factor {0}: must be 0 (fixed) or at least 2")]
    InvalidGrowthFactor(u32),

    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Writing a report snapshot to the output sink failed
    #[error("failed to write report: {0}")]
    Write(#[from] io::Error),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to create latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

impl ReportError {
    /// Whether this error was raised while validating configuration, before
    /// any record was processed.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ReportError::InvalidBuckets(_)
                | ReportError::InvalidDuration { .. }
                | ReportError::UnknownReportType(_)
                | ReportError::DeprecatedReportType(_)
                | ReportError::InvalidGrowthFactor(_)
        )
    }
}

/// Errors produced by a record decoder. A clean end of stream is not an error.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON record on line {line}: {source}")]
    Json {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid CSV record on line {line}: {reason}")]
    Csv { line: u64, reason: String },
}
