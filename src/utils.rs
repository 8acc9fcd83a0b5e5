//! # Duration Parsing and Formatting
//!
//! Load generators and operators exchange latencies as compact duration
//! literals such as `250us`, `1.5ms` or `1m30s`. This module converts between
//! those literals and [`Duration`], and is shared by the histogram bucket
//! parser, the `--every` option and every report renderer.
//!
//! ## Literal Grammar
//!
//! A literal is a sequence of `<number><unit>` pairs, e.g. `1h15m` or `2.5s`.
//! The number may carry a fractional part and the unit is one of `ns`, `us`
//! (also `µs`/`μs`), `ms`, `s`, `m` or `h`. A bare `0` is accepted without a
//! unit. Negative durations are rejected because latencies cannot be negative.
//!
//! ## Rendering
//!
//! [`format_duration`] produces the shortest exact representation, choosing
//! a sub-second unit for values below one second and an `h`/`m`/`s` compound
//! form above it:
//!
//! ```rust
//! use latency_report::utils::{format_duration, parse_duration};
//! use std::time::Duration;
//!
//! assert_eq!(format_duration(Duration::ZERO), "0s");
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
//! assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
//! assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
//! ```

use crate::error::ReportError;
use std::fmt::Write as _;
use std::time::Duration;

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_MIN: u64 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MIN;

/// Parse a duration literal such as `10ms`, `1.5s` or `1h2m3s`
///
/// Surrounding whitespace is ignored. Every component needs a unit except
/// the literal `0`.
pub fn parse_duration(input: &str) -> Result<Duration, ReportError> {
    let invalid = |reason: &str| ReportError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid("duration cannot be empty"));
    }
    if s.starts_with('-') {
        return Err(invalid("duration cannot be negative"));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total: u64 = 0;

    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(num_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let scale = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => NANOS_PER_MIN,
            "h" => NANOS_PER_HOUR,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid(&format!("unknown unit {:?}", unit))),
        };

        let nanos = scale_component(number, scale).ok_or_else(|| invalid("invalid number"))?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| invalid("duration out of range"))?;

        rest = tail;
    }

    Ok(Duration::from_nanos(total))
}

/// Convert one `<number>` of a literal into nanoseconds using `scale`.
fn scale_component(number: &str, scale: u64) -> Option<u64> {
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let int_value: u64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let mut nanos = int_value.checked_mul(scale)?;

    if !frac_part.is_empty() {
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Digits beyond nanosecond resolution of the largest unit do not matter.
        let digits = &frac_part[..frac_part.len().min(18)];
        let frac_value: u64 = digits.parse().ok()?;
        let divisor = 10u128.pow(digits.len() as u32);
        let frac_nanos = (frac_value as u128 * scale as u128 + divisor / 2) / divisor;
        nanos = nanos.checked_add(u64::try_from(frac_nanos).ok()?)?;
    }

    Some(nanos)
}

/// Format a duration in its shortest exact form
///
/// - zero renders as `0s`
/// - below one second a single unit is used: `750ns`, `1.25µs`, `2.5ms`
/// - from one second on, hours and minutes lead when present: `5.25s`,
///   `1m30s`, `2h0m0s`
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns == 0 {
        return "0s".to_string();
    }
    if total_ns < NANOS_PER_MICRO as u128 {
        return format!("{}ns", total_ns);
    }
    if total_ns < NANOS_PER_MILLI as u128 {
        return format!("{}µs", fixed_point(total_ns, 3));
    }
    if total_ns < NANOS_PER_SEC as u128 {
        return format!("{}ms", fixed_point(total_ns, 6));
    }

    let hours = total_ns / NANOS_PER_HOUR as u128;
    let minutes = (total_ns % NANOS_PER_HOUR as u128) / NANOS_PER_MIN as u128;
    let seconds = total_ns % NANOS_PER_MIN as u128;

    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{}h", hours);
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{}m", minutes);
    }
    let _ = write!(out, "{}s", fixed_point(seconds, 9));
    out
}

/// Render `value / 10^digits` without trailing fractional zeros.
fn fixed_point(value: u128, digits: u32) -> String {
    let scale = 10u128.pow(digits);
    let int = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return int.to_string();
    }
    let frac = format!("{:0width$}", frac, width = digits as usize);
    format!("{}.{}", int, frac.trim_end_matches('0'))
}
