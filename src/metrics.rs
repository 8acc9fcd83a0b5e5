use crate::error::ReportError;
use crate::histogram::Histogram;
use crate::record::Record;
use chrono::{DateTime, Utc};
use hdrhistogram::{CreationError, Histogram as HdrHistogram};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Latency percentiles reported in every snapshot
const QUANTILES: [f64; 4] = [0.50, 0.90, 0.95, 0.99];

/// Latency collector using HDR histogram for percentile estimation
#[derive(Debug, Clone)]
pub struct LatencyCollector {
    histogram: HdrHistogram<u64>,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl LatencyCollector {
    pub fn new() -> Result<Self, CreationError> {
        // 3 significant figures, auto-resizing so no sample is ever rejected
        let histogram = HdrHistogram::<u64>::new(3)?;

        Ok(Self {
            histogram,
            total: Duration::ZERO,
            min: None,
            max: Duration::ZERO,
        })
    }

    /// Record a latency measurement
    ///
    /// The histogram grows to fit the sample; only values beyond what it can
    /// ever track are clamped to its highest trackable value.
    pub fn record(&mut self, latency: Duration) {
        let latency_ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        if self.histogram.record(latency_ns).is_err() {
            self.histogram.saturating_record(latency_ns);
        }
        self.total = self.total.saturating_add(latency);
        self.min = Some(self.min.map_or(latency, |min| min.min(latency)));
        self.max = self.max.max(latency);
    }

    /// Get the current latency summary
    pub fn get_metrics(&self) -> LatencyMetrics {
        let count = self.histogram.len();
        let mean = if count > 0 {
            Duration::from_nanos((self.total.as_nanos() / count as u128) as u64)
        } else {
            Duration::ZERO
        };
        let quantile = |q: f64| {
            if count > 0 {
                Duration::from_nanos(self.histogram.value_at_quantile(q))
            } else {
                Duration::ZERO
            }
        };

        LatencyMetrics {
            total: self.total,
            mean,
            p50: quantile(QUANTILES[0]),
            p90: quantile(QUANTILES[1]),
            p95: quantile(QUANTILES[2]),
            p99: quantile(QUANTILES[3]),
            max: self.max,
            min: self.min.unwrap_or_default(),
        }
    }
}

/// Latency summary, serialized in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyMetrics {
    #[serde(with = "crate::record::nanos")]
    pub total: Duration,
    #[serde(with = "crate::record::nanos")]
    pub mean: Duration,
    #[serde(rename = "50th", with = "crate::record::nanos")]
    pub p50: Duration,
    #[serde(rename = "90th", with = "crate::record::nanos")]
    pub p90: Duration,
    #[serde(rename = "95th", with = "crate::record::nanos")]
    pub p95: Duration,
    #[serde(rename = "99th", with = "crate::record::nanos")]
    pub p99: Duration,
    #[serde(with = "crate::record::nanos")]
    pub max: Duration,
    #[serde(with = "crate::record::nanos")]
    pub min: Duration,
}

/// Byte counters for one direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ByteMetrics {
    pub total: u64,
    pub mean: f64,
}

/// Point-in-time view of everything a [`Metrics`] accumulator has seen
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot<'a> {
    pub latencies: LatencyMetrics,
    pub bytes_in: ByteMetrics,
    pub bytes_out: ByteMetrics,
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Time between the earliest and latest request start
    #[serde(with = "crate::record::nanos")]
    pub duration: Duration,
    /// Extra time waiting for the last response after the last request
    #[serde(with = "crate::record::nanos")]
    pub wait: Duration,
    pub requests: u64,
    pub rate: f64,
    pub throughput: f64,
    pub success: f64,
    pub status_codes: &'a BTreeMap<String, u64>,
    pub errors: &'a BTreeSet<String>,
    #[serde(rename = "buckets", skip_serializing_if = "Option::is_none")]
    pub histogram: Option<&'a Histogram>,
}

/// Running aggregate over a stream of records
///
/// Adding is cheap; every derived figure is computed on demand by
/// [`Metrics::snapshot`], so a snapshot can be taken at any point while the
/// stream is still open.
#[derive(Debug, Clone)]
pub struct Metrics {
    latencies: LatencyCollector,
    bytes_in: u64,
    bytes_out: u64,
    earliest: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    requests: u64,
    successes: u64,
    status_codes: BTreeMap<String, u64>,
    errors: BTreeSet<String>,
    histogram: Option<Histogram>,
}

impl Metrics {
    pub fn new() -> Result<Self, ReportError> {
        Ok(Self {
            latencies: LatencyCollector::new()?,
            bytes_in: 0,
            bytes_out: 0,
            earliest: None,
            latest: None,
            end: None,
            requests: 0,
            successes: 0,
            status_codes: BTreeMap::new(),
            errors: BTreeSet::new(),
            histogram: None,
        })
    }

    /// Create an accumulator that also fills a latency histogram.
    pub fn with_histogram(histogram: Histogram) -> Result<Self, ReportError> {
        Ok(Self {
            histogram: Some(histogram),
            ..Self::new()?
        })
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }

    pub fn add(&mut self, record: &Record) {
        self.requests += 1;
        *self.status_codes.entry(record.code.to_string()).or_insert(0) += 1;

        self.bytes_out += record.bytes_out;
        self.bytes_in += record.bytes_in;
        self.latencies.record(record.latency);

        if self.earliest.map_or(true, |t| record.timestamp < t) {
            self.earliest = Some(record.timestamp);
        }
        if self.latest.map_or(true, |t| record.timestamp > t) {
            self.latest = Some(record.timestamp);
        }
        let end = chrono::Duration::from_std(record.latency)
            .ok()
            .and_then(|latency| record.timestamp.checked_add_signed(latency))
            .unwrap_or(record.timestamp);
        if self.end.map_or(true, |t| end > t) {
            self.end = Some(end);
        }

        if record.is_success() {
            self.successes += 1;
        }
        if !record.error.is_empty() {
            self.errors.insert(record.error.clone());
        }

        if let Some(histogram) = self.histogram.as_mut() {
            histogram.add(record);
        }
    }

    /// Compute the derived metrics without changing the accumulator.
    pub fn snapshot(&self) -> MetricsSnapshot<'_> {
        let earliest = self.earliest.unwrap_or_default();
        let latest = self.latest.unwrap_or_default();
        let end = self.end.unwrap_or_default();

        let duration = (latest - earliest).to_std().unwrap_or_default();
        let wait = (end - latest).to_std().unwrap_or_default();

        let requests = self.requests as f64;
        let success = if self.requests > 0 {
            self.successes as f64 / requests
        } else {
            0.0
        };

        let duration_secs = duration.as_secs_f64();
        let rate = if duration_secs > 0.0 {
            requests / duration_secs
        } else {
            0.0
        };

        let elapsed_secs = (duration + wait).as_secs_f64();
        let throughput = if elapsed_secs > 0.0 {
            self.successes as f64 / elapsed_secs
        } else {
            0.0
        };

        MetricsSnapshot {
            latencies: self.latencies.get_metrics(),
            bytes_in: byte_metrics(self.bytes_in, self.requests),
            bytes_out: byte_metrics(self.bytes_out, self.requests),
            earliest,
            latest,
            end,
            duration,
            wait,
            requests: self.requests,
            rate,
            throughput,
            success,
            status_codes: &self.status_codes,
            errors: &self.errors,
            histogram: self.histogram.as_ref(),
        }
    }
}

fn byte_metrics(total: u64, requests: u64) -> ByteMetrics {
    let mean = if requests > 0 {
        total as f64 / requests as f64
    } else {
        0.0
    };
    ByteMetrics { total, mean }
}
