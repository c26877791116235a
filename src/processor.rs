//! Raw sample → timestamped [`Reading`] conversion.

use crate::domain::Reading;
use crate::error::{ConfigError, ParseError};
use chrono::{DateTime, TimeDelta, Utc};

/// Physical range of the sensor, inclusive.
pub const MIN_TEMPERATURE: f64 = -100.0;
pub const MAX_TEMPERATURE: f64 = 100.0;

/// How accepted samples are timestamped. Fixed for the processor's lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeMode {
    /// stamp with the current instant
    Realtime,
    /// stamp with `start + (now - start) * multiplier`
    Accelerated { start: DateTime<Utc>, multiplier: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct ReadingProcessor {
    mode: TimeMode,
}

impl ReadingProcessor {
    pub fn realtime() -> Self {
        Self { mode: TimeMode::Realtime }
    }

    /// Time-accelerated processor. The multiplier must be finite and `>= 0`.
    pub fn accelerated(start: DateTime<Utc>, multiplier: f64) -> Result<Self, ConfigError> {
        if !(multiplier.is_finite() && multiplier >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "accelerate",
                reason: format!("multiplier {multiplier} must be a finite value >= 0"),
            });
        }
        Ok(Self { mode: TimeMode::Accelerated { start, multiplier } })
    }

    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    /// Accept `raw` if it lies within the sensor range, stamped according to
    /// the time mode. Non-finite values are rejected, and so is a sample whose
    /// accelerated timestamp falls outside the representable range.
    pub fn process(&self, raw: f64, now: DateTime<Utc>) -> Option<Reading> {
        if !raw.is_finite() || !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&raw) {
            return None;
        }
        let timestamp = match self.mode {
            TimeMode::Realtime => now,
            TimeMode::Accelerated { start, multiplier } => {
                let Some(timestamp) = scaled_instant(start, now, multiplier) else {
                    tracing::warn!(%start, %now, multiplier, "accelerated timestamp out of range, sample rejected");
                    return None;
                };
                timestamp
            }
        };
        Some(Reading::new(timestamp, raw))
    }
}

// `as i64` saturates, so only the TimeDelta and DateTime bounds can fail
fn scaled_instant(start: DateTime<Utc>, now: DateTime<Utc>, multiplier: f64) -> Option<DateTime<Utc>> {
    let elapsed_ms = (now - start).num_milliseconds() as f64;
    let scaled = TimeDelta::try_milliseconds((elapsed_ms * multiplier).round() as i64)?;
    start.checked_add_signed(scaled)
}

/// Parse one line of sensor text as a decimal number.
pub fn parse_sample(text: &str) -> Result<f64, ParseError> {
    text.trim().parse::<f64>().map_err(|_| ParseError::Sample(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn realtime_stamps_with_now() {
        let p = ReadingProcessor::realtime();
        assert_eq!(p.mode(), TimeMode::Realtime);
        let reading = p.process(21.5, t0()).expect("accepted");
        assert_eq!(reading, Reading::new(t0(), 21.5));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let p = ReadingProcessor::realtime();
        assert!(p.process(-100.0, t0()).is_some());
        assert!(p.process(100.0, t0()).is_some());
        assert!(p.process(-100.001, t0()).is_none());
        assert!(p.process(100.5, t0()).is_none());
    }

    #[test]
    fn non_finite_samples_are_rejected() {
        let p = ReadingProcessor::realtime();
        assert!(p.process(f64::NAN, t0()).is_none());
        assert!(p.process(f64::INFINITY, t0()).is_none());
    }

    #[test]
    fn accelerated_scales_elapsed_time() {
        let p = ReadingProcessor::accelerated(t0(), 60.0).unwrap();
        assert_eq!(p.mode(), TimeMode::Accelerated { start: t0(), multiplier: 60.0 });
        let reading = p.process(20.0, t0() + TimeDelta::seconds(10)).unwrap();
        assert_eq!(reading.timestamp, t0() + TimeDelta::minutes(10));
    }

    #[test]
    fn zero_multiplier_pins_time_to_start() {
        let p = ReadingProcessor::accelerated(t0(), 0.0).unwrap();
        let reading = p.process(20.0, t0() + TimeDelta::hours(5)).unwrap();
        assert_eq!(reading.timestamp, t0());
    }

    #[test]
    fn timestamp_overflow_rejects_the_sample() {
        let p = ReadingProcessor::accelerated(t0(), 1e12).unwrap();
        assert!(p.process(20.0, t0() + TimeDelta::seconds(60)).is_none());
        // still fine close to the start instant
        assert_eq!(p.process(20.0, t0()).map(|r| r.timestamp), Some(t0()));

        let p = ReadingProcessor::accelerated(t0(), f64::MAX).unwrap();
        assert!(p.process(20.0, t0() - TimeDelta::seconds(1)).is_none());
    }

    #[test]
    fn negative_multiplier_is_rejected() {
        assert!(ReadingProcessor::accelerated(t0(), -1.0).is_err());
        assert!(ReadingProcessor::accelerated(t0(), f64::NAN).is_err());
    }

    #[test]
    fn sample_parsing() {
        assert_eq!(parse_sample(" 23.125 ").unwrap(), 23.125);
        assert_eq!(parse_sample("-4").unwrap(), -4.0);
        assert_eq!(parse_sample("t=21"), Err(ParseError::Sample("t=21".to_string())));
    }
}
