//! # Reporters
//!
//! A reporter aggregates records and renders what it has seen so far. Every
//! variant offers the same capability set:
//!
//! - `add` folds one record into the aggregate
//! - `report` renders the current aggregate without changing it, so it can be
//!   called any number of times while the stream is open
//! - `close` finalizes the aggregate once the stream has ended; most variants
//!   have nothing to finalize
//!
//! The variant is picked once at startup from [`ReportConfig`] and stays the
//! same for the whole run, so the set is a closed enum rather than a trait
//! object.

use crate::cli::ReportConfig;
use crate::error::ReportError;
use crate::histogram::{Buckets, Histogram};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::record::Record;
use crate::utils::format_duration;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Width of a full histogram bar in characters
const BAR_WIDTH: f64 = 75.0;

/// Aggregates records and renders reports
pub trait Reporter {
    fn add(&mut self, record: &Record);

    /// Render the current aggregate into `out`.
    fn report(&self, out: &mut dyn Write) -> Result<(), ReportError>;

    /// Finalize the aggregate at stream end.
    fn close(&mut self) {}
}

/// Report kinds selectable on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportKind {
    Text,
    Json,
    /// Histogram, optionally carrying buckets from the legacy `hist[...]` form
    Histogram(Option<String>),
}

impl FromStr for ReportKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ReportKind::Text),
            "json" => Ok(ReportKind::Json),
            "hist" => Ok(ReportKind::Histogram(None)),
            "plot" => Err(ReportError::DeprecatedReportType(s.to_string())),
            _ => match s.strip_prefix("hist") {
                Some(buckets) if buckets.starts_with('[') => {
                    Ok(ReportKind::Histogram(Some(buckets.to_string())))
                }
                _ => Err(ReportError::UnknownReportType(s.to_string())),
            },
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Text => write!(f, "text"),
            ReportKind::Json => write!(f, "json"),
            ReportKind::Histogram(_) => write!(f, "hist"),
        }
    }
}

/// The reporter selected for a run
#[derive(Debug, Clone)]
pub enum AnyReporter {
    Text(Metrics),
    Json(Metrics),
    Histogram(Histogram),
}

impl AnyReporter {
    /// Build the reporter described by `config`.
    ///
    /// The histogram variant without explicit buckets uses automatic binning
    /// starting at `[0, 1ms]`; explicit buckets are fixed unless a growth
    /// factor is also configured.
    pub fn from_config(config: &ReportConfig) -> Result<Self, ReportError> {
        let histogram = |buckets: Buckets| match config.growth_factor {
            Some(factor) => Histogram::with_growth(buckets, factor),
            None => Ok(Histogram::fixed(buckets)),
        };

        match config.kind {
            ReportKind::Text => Ok(AnyReporter::Text(Metrics::new()?)),
            ReportKind::Json => match &config.buckets {
                Some(buckets) => Ok(AnyReporter::Json(Metrics::with_histogram(histogram(
                    buckets.clone(),
                )?)?)),
                None => Ok(AnyReporter::Json(Metrics::new()?)),
            },
            ReportKind::Histogram(_) => match (&config.buckets, config.growth_factor) {
                (Some(buckets), _) => Ok(AnyReporter::Histogram(histogram(buckets.clone())?)),
                (None, Some(factor)) => Ok(AnyReporter::Histogram(Histogram::with_growth(
                    Buckets::auto(),
                    factor,
                )?)),
                (None, None) => Ok(AnyReporter::Histogram(Histogram::auto())),
            },
        }
    }

    /// Number of records aggregated so far
    pub fn records(&self) -> u64 {
        match self {
            AnyReporter::Text(metrics) | AnyReporter::Json(metrics) => metrics.requests(),
            AnyReporter::Histogram(histogram) => histogram.total(),
        }
    }
}

impl Reporter for AnyReporter {
    fn add(&mut self, record: &Record) {
        match self {
            AnyReporter::Text(metrics) | AnyReporter::Json(metrics) => metrics.add(record),
            AnyReporter::Histogram(histogram) => histogram.add(record),
        }
    }

    fn report(&self, out: &mut dyn Write) -> Result<(), ReportError> {
        match self {
            AnyReporter::Text(metrics) => write_text(&metrics.snapshot(), out),
            AnyReporter::Json(metrics) => write_json(&metrics.snapshot(), out),
            AnyReporter::Histogram(histogram) => write_histogram(histogram, out),
        }
    }

    fn close(&mut self) {
        if let AnyReporter::Histogram(histogram) = self {
            histogram.close();
        }
    }
}

fn write_text(m: &MetricsSnapshot<'_>, out: &mut dyn Write) -> Result<(), ReportError> {
    let l = &m.latencies;
    let latencies = [l.min, l.mean, l.p50, l.p90, l.p95, l.p99, l.max]
        .iter()
        .map(|d| format_duration(*d))
        .collect::<Vec<_>>()
        .join(", ");
    let codes = m
        .status_codes
        .iter()
        .map(|(code, count)| format!("{}:{}", code, count))
        .collect::<Vec<_>>()
        .join("  ");

    let rows = [
        (
            "Requests",
            "[total, rate, throughput]",
            format!("{}, {:.2}, {:.2}", m.requests, m.rate, m.throughput),
        ),
        (
            "Duration",
            "[total, attack, wait]",
            format!(
                "{}, {}, {}",
                format_duration(m.duration + m.wait),
                format_duration(m.duration),
                format_duration(m.wait)
            ),
        ),
        ("Latencies", "[min, mean, 50, 90, 95, 99, max]", latencies),
        (
            "Bytes In",
            "[total, mean]",
            format!("{}, {:.2}", m.bytes_in.total, m.bytes_in.mean),
        ),
        (
            "Bytes Out",
            "[total, mean]",
            format!("{}, {:.2}", m.bytes_out.total, m.bytes_out.mean),
        ),
        ("Success", "[ratio]", format!("{:.2}%", m.success * 100.0)),
        ("Status Codes", "[code:count]", codes),
    ];

    for (name, fields, values) in rows {
        writeln!(out, "{:<14}{:<34}{}", name, fields, values)?;
    }
    writeln!(out, "Error Set:")?;
    for error in m.errors {
        writeln!(out, "{}", error)?;
    }
    out.flush()?;
    Ok(())
}

fn write_json(m: &MetricsSnapshot<'_>, out: &mut dyn Write) -> Result<(), ReportError> {
    serde_json::to_writer(&mut *out, m)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn write_histogram(histogram: &Histogram, out: &mut dyn Write) -> Result<(), ReportError> {
    let buckets = histogram.buckets();
    let counts = histogram.counts();
    let rows = counts.len().min(buckets.len());

    let labels: Vec<(String, String)> = (0..rows).map(|i| buckets.nth(i)).collect();
    let lower_width = labels.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
    let upper_width = labels.iter().map(|(_, u)| u.chars().count()).max().unwrap_or(0);
    let count_width = counts.iter().map(|c| c.to_string().len()).max().unwrap_or(1);
    let bucket_width = (lower_width + upper_width + 4).max("Bucket".len());

    writeln!(
        out,
        "{:<bw$}  {:>cw$}  {:>7}  Histogram",
        "Bucket",
        "#",
        "%",
        bw = bucket_width,
        cw = count_width
    )?;

    let total = histogram.total();
    for ((lower, upper), count) in labels.iter().zip(counts) {
        let ratio = if total > 0 {
            *count as f64 / total as f64
        } else {
            0.0
        };
        let label = format!(
            "[{:>lw$}, {:>uw$}]",
            lower,
            upper,
            lw = lower_width,
            uw = upper_width
        );
        writeln!(
            out,
            "{:<bw$}  {:>cw$}  {:>6.2}%  {}",
            label,
            count,
            ratio * 100.0,
            "#".repeat((ratio * BAR_WIDTH).round() as usize),
            bw = bucket_width,
            cw = count_width
        )?;
    }
    out.flush()?;
    Ok(())
}
