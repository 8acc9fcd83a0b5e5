//! # Bucketed Latency Histogram
//!
//! A [`Histogram`] classifies latency samples into ranges delimited by an
//! ordered list of lower bounds ([`Buckets`]). Bucket `i` covers
//! `[buckets[i], buckets[i+1])`; how the last bucket behaves depends on the
//! growth factor:
//!
//! - **Fixed** (`growth_factor == 0`): the last bucket is a catch-all for every
//!   sample at or above the last boundary. [`Histogram::close`] leaves the
//!   layout untouched so histograms from repeated runs stay comparable.
//! - **Automatic** (`growth_factor >= 2`): a sample beyond the last boundary
//!   appends boundaries `last * growth_factor` until it fits. At stream end
//!   [`Histogram::close`] prunes the empty buckets on both ends.
//!
//! The serialized form is the bare list of counts. Consumers are expected to
//! know the bucket layout that produced it.

use crate::defaults;
use crate::error::ReportError;
use crate::record::Record;
use crate::utils::{format_duration, parse_duration};
use serde::{Serialize, Serializer};
use std::str::FromStr;
use std::time::Duration;

/// Ordered lower bounds of a histogram's buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets(Vec<Duration>);

impl Buckets {
    pub fn new(bounds: Vec<Duration>) -> Result<Self, ReportError> {
        if bounds.is_empty() {
            return Err(ReportError::InvalidBuckets("[]".to_string()));
        }
        Ok(Self(bounds))
    }

    /// The layout used for automatic binning: `[0, 1ms]`.
    pub fn auto() -> Self {
        Self(defaults::AUTO_BUCKETS.to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Duration] {
        &self.0
    }

    /// Display labels of bucket `i` as `(lower, upper)`.
    ///
    /// The upper label of the last bucket is `+Inf`.
    pub fn nth(&self, i: usize) -> (String, String) {
        let lower = format_duration(self.0[i]);
        match self.0.get(i + 1) {
            Some(upper) => (lower, format_duration(*upper)),
            None => (lower, "+Inf".to_string()),
        }
    }
}

impl FromStr for Buckets {
    type Err = ReportError;

    /// Parse a bracketed list such as `[0,1ms,10ms]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ReportError::InvalidBuckets(s.to_string());

        let inner = s
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(bad)?;
        if inner.trim().is_empty() {
            return Err(bad());
        }

        let bounds = inner
            .split(',')
            .map(|token| parse_duration(token.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        Buckets::new(bounds)
    }
}

/// Bucketed latency histogram
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Buckets,
    counts: Vec<u64>,
    total: u64,
    growth_factor: u32,
}

impl Histogram {
    /// Create a histogram with fixed buckets; the last one is a catch-all.
    pub fn fixed(buckets: Buckets) -> Self {
        let counts = vec![0; buckets.len()];
        Self {
            buckets,
            counts,
            total: 0,
            growth_factor: 0,
        }
    }

    /// Create a histogram with the given growth factor.
    ///
    /// A factor of 0 behaves like [`Histogram::fixed`]; 1 is rejected because
    /// it could never extend the bucket range.
    pub fn with_growth(buckets: Buckets, growth_factor: u32) -> Result<Self, ReportError> {
        if growth_factor == 1 {
            return Err(ReportError::InvalidGrowthFactor(growth_factor));
        }
        let mut histogram = Self::fixed(buckets);
        histogram.growth_factor = growth_factor;
        Ok(histogram)
    }

    /// Histogram with the default automatic layout: `[0, 1ms]`, doubling.
    pub fn auto() -> Self {
        let mut histogram = Self::fixed(Buckets::auto());
        histogram.growth_factor = defaults::GROWTH_FACTOR;
        histogram
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn growth_factor(&self) -> u32 {
        self.growth_factor
    }

    /// Count one record's latency.
    pub fn add(&mut self, record: &Record) {
        self.add_latency(record.latency);
    }

    pub fn add_latency(&mut self, latency: Duration) {
        let index = self.find_bucket(latency);

        if self.counts.len() < self.buckets.len() {
            self.counts.resize(self.buckets.len(), 0);
        }

        self.counts[index] += 1;
        self.total += 1;
    }

    /// Index of the bucket `latency` belongs to, growing the layout first when
    /// automatic binning is enabled and the sample is beyond the last bound.
    pub fn find_bucket(&mut self, latency: Duration) -> usize {
        let bounds = self.buckets.as_slice();

        if latency < bounds[0] {
            return 0;
        }

        // Bounds are ascending, so the first bound above the sample closes its bucket.
        if let Some(upper) = bounds.iter().position(|&b| latency < b) {
            return upper - 1;
        }

        if self.growth_factor > 0 {
            if let Some(index) = self.grow_to_fit(latency) {
                return index;
            }
        }

        self.buckets.len() - 1
    }

    /// Append geometric bounds until `latency` falls inside the newest bucket.
    ///
    /// Returns `None` when the next bound would overflow `Duration`, in which
    /// case the sample belongs to the existing last bucket.
    fn grow_to_fit(&mut self, latency: Duration) -> Option<usize> {
        loop {
            let last = *self.buckets.0.last()?;
            let next = if last.is_zero() {
                Duration::from_nanos(1)
            } else {
                last.checked_mul(self.growth_factor)?
            };
            self.buckets.0.push(next);

            if latency < next {
                return Some(self.buckets.len() - 2);
            }
        }
    }

    /// Finalize the histogram at stream end.
    ///
    /// With fixed buckets nothing changes. With automatic binning, leading and
    /// trailing empty buckets are dropped; an entirely empty histogram
    /// collapses to its first bucket.
    pub fn close(&mut self) {
        if self.growth_factor == 0 {
            return;
        }

        let first = self.counts.iter().position(|&c| c > 0);
        let last = self.counts.iter().rposition(|&c| c > 0);

        let (a, b) = match (first, last) {
            (Some(a), Some(b)) => (a, b),
            _ => (0, 0),
        };

        self.counts.resize(self.counts.len().max(b + 1), 0);
        self.counts.truncate(b + 1);
        self.counts.drain(..a);

        self.buckets.0.truncate(b + 1);
        self.buckets.0.drain(..a);
    }
}

impl Serialize for Histogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.counts)
    }
}
