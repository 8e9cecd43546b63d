//! Domain (time axis) conversions for domain descriptors
//!
//! A domain descriptor maps raw tick values to wall-clock time through its
//! `origin` (an ISO-8601 instant) and `tick_resolution` (seconds per tick as a
//! ratio). Conversions are computed in integer nanoseconds and rounded to
//! nearest, ties away from zero.

use chrono::{DateTime, Duration, FixedOffset};

use super::{DataDescriptor, DataRule, Number, Ratio};
use crate::{DaqError, Result};

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Normalize `Z` and `+hhmm` suffixes to the `+hh:mm` form RFC 3339 expects.
pub fn normalize_origin(origin: &str) -> String {
    let trimmed = origin.trim();
    if let Some(stripped) = trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        return format!("{}+00:00", stripped);
    }

    let bytes = trimmed.as_bytes();
    if bytes.len() > 5 {
        let tail = &bytes[bytes.len() - 5..];
        let is_compact_offset =
            matches!(tail[0], b'+' | b'-') && tail[1..].iter().all(u8::is_ascii_digit);
        if is_compact_offset && bytes.iter().any(|b| *b == b'T' || *b == b't') {
            let (head, offset) = trimmed.split_at(trimmed.len() - 5);
            return format!("{}{}:{}", head, &offset[..3], &offset[3..]);
        }
    }

    trimmed.to_string()
}

/// Parse an origin string into a fixed-offset instant.
pub fn parse_origin(origin: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(&normalize_origin(origin))
        .map_err(|source| DaqError::OriginParse { value: origin.to_string(), source })
}

/// Integer division rounding to nearest, ties away from zero.
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator.abs() {
        if (numerator < 0) == (denominator < 0) { quotient + 1 } else { quotient - 1 }
    } else {
        quotient
    }
}

impl DataDescriptor {
    fn checked_resolution(&self) -> Result<Ratio> {
        match self.tick_resolution() {
            Some(resolution) if resolution.denominator == 0 => {
                Err(DaqError::domain("tick resolution denominator is zero"))
            }
            Some(resolution) => Ok(resolution),
            None => Err(DaqError::domain("descriptor has no tick resolution")),
        }
    }

    /// Parsed `origin`; domain error when the descriptor has none.
    pub fn origin_time(&self) -> Result<DateTime<FixedOffset>> {
        let origin =
            self.origin().ok_or_else(|| DaqError::domain("descriptor has no origin"))?;
        parse_origin(origin)
    }

    /// Nanoseconds since origin represented by the raw domain value `value`.
    pub fn ticks_to_nanos(&self, value: Number) -> Result<i64> {
        let resolution = self.checked_resolution()?;

        let nanos = match value {
            Number::Int(ticks) => {
                let scaled = (resolution.numerator as i128)
                    .checked_mul(ticks as i128)
                    .and_then(|v| v.checked_mul(NANOS_PER_SECOND))
                    .ok_or_else(|| DaqError::domain("tick value overflows"))?;
                div_round(scaled, resolution.denominator as i128)
            }
            Number::Float(ticks) => {
                let seconds = ticks * resolution.as_f64();
                let nanos = seconds * NANOS_PER_SECOND as f64;
                if !nanos.is_finite() {
                    return Err(DaqError::domain("tick value is not finite"));
                }
                nanos.round() as i128
            }
        };

        i64::try_from(nanos).map_err(|_| DaqError::domain("tick value overflows"))
    }

    /// Wall-clock time of the raw domain value `value`.
    pub fn ticks_to_time(&self, value: Number) -> Result<DateTime<FixedOffset>> {
        let origin = self.origin_time()?;
        let nanos = self.ticks_to_nanos(value)?;
        origin
            .checked_add_signed(Duration::nanoseconds(nanos))
            .ok_or_else(|| DaqError::domain("time is out of range"))
    }

    /// Constant sample rate in Hz derived from a linear domain rule.
    ///
    /// The rate `den / (num * delta)` must be integral.
    pub fn sample_rate(&self) -> Result<i64> {
        let delta = match self.rule() {
            DataRule::Linear { delta, .. } => *delta,
            other => {
                return Err(DaqError::domain(format!(
                    "sample rate requires a linear rule, found {:?}",
                    other
                )));
            }
        };
        let resolution = self.checked_resolution()?;

        match delta {
            Number::Int(delta) => {
                let period = (resolution.numerator as i128) * (delta as i128);
                if period == 0 {
                    return Err(DaqError::domain("linear delta is zero"));
                }
                let den = resolution.denominator as i128;
                if den % period != 0 {
                    return Err(DaqError::domain(format!(
                        "sample rate {}/{} is not integral",
                        den, period
                    )));
                }
                i64::try_from(den / period).map_err(|_| DaqError::domain("sample rate overflows"))
            }
            Number::Float(delta) => {
                let rate = resolution.denominator as f64 / (resolution.numerator as f64 * delta);
                if !rate.is_finite() || rate.fract() != 0.0 {
                    return Err(DaqError::domain(format!("sample rate {} is not integral", rate)));
                }
                Ok(rate as i64)
            }
        }
    }
}
