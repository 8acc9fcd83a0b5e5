//! Result records produced by a load generator.
//!
//! A [`Record`] describes one completed request. The aggregation engine only
//! needs its latency; the metrics accumulator also looks at the status code,
//! byte counts, timestamp and error text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One request outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub attack: String,
    #[serde(default)]
    pub seq: u64,
    /// HTTP status code, 0 when the request never got a response
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    /// Time from sending the request to reading the full response
    #[serde(with = "nanos")]
    pub latency: Duration,
    #[serde(default)]
    pub bytes_out: u64,
    #[serde(default)]
    pub bytes_in: u64,
    /// Error text, empty on success
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
}

impl Record {
    /// Create a record carrying only a latency and a 200 status.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            code: 200,
            latency,
            ..Default::default()
        }
    }

    /// Whether the request completed with a 2xx or 3xx status
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.code)
    }
}

/// Serialize a [`Duration`] as integer nanoseconds.
pub(crate) mod nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
