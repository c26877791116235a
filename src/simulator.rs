//! Synthetic temperature waveform.
//!
//! Shared by the simulated serial backend and the `thermolog-sim` tool that
//! feeds a real port. Seasonal swing of ±10 °C, a daily sine of configurable
//! amplitude, a per-day offset in [-5, 5] so consecutive days differ, and
//! ±0.5 °C of per-sample noise. Everything is a pure function of time, so
//! the same instant always gives the same value.

use crate::config::SimulatorConfig;
use chrono::{DateTime, Utc};
use std::f64::consts::TAU;

const DAY_SECS: f64 = 24.0 * 3600.0;
const YEAR_SECS: f64 = 365.2425 * DAY_SECS;
const SEASONAL_SWING: f64 = 10.0;
const MAX_DAILY_OFFSET: f64 = 5.0;
const NOISE_AMPLITUDE: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct TemperatureModel {
    base: f64,
    amplitude: f64,
    multiplier: f64,
}

impl TemperatureModel {
    pub fn new(base: f64, amplitude: f64, multiplier: f64) -> Self {
        Self { base, amplitude, multiplier }
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(config.base_temperature, config.amplitude, config.time_multiplier)
    }

    pub fn with_multiplier(self, multiplier: f64) -> Self {
        Self { multiplier, ..self }
    }

    /// Simulated temperature at a wall-clock instant. Elapsed time since the
    /// epoch is scaled by the multiplier before the waveform is evaluated.
    pub fn temperature_at(&self, at: DateTime<Utc>) -> f64 {
        let t = at.timestamp_millis() as f64 / 1000.0 * self.multiplier;

        let season = (TAU * t / YEAR_SECS).sin();
        let daily = (TAU * t.rem_euclid(DAY_SECS) / DAY_SECS).sin();
        let day = (t / DAY_SECS).floor();

        self.base + SEASONAL_SWING * season + self.amplitude * daily + daily_offset(day) + noise(t)
    }
}

/// Deterministic pseudo-random offset for a simulated day.
fn daily_offset(day: f64) -> f64 {
    MAX_DAILY_OFFSET * (day * 12.9898).sin()
}

/// Sample-to-sample noise, hashed from the scaled time instead of an RNG.
fn noise(t: f64) -> f64 {
    NOISE_AMPLITUDE * (t * 78.233).sin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    #[test]
    fn stays_within_physical_envelope() {
        let model = TemperatureModel::new(20.0, 15.0, 1.0);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for hour in 0..(24 * 400) {
            let t = model.temperature_at(start + TimeDelta::hours(hour));
            assert!((-10.5..=50.5).contains(&t), "{t} out of envelope at hour {hour}");
        }
    }

    #[test]
    fn zero_multiplier_freezes_the_waveform() {
        let model = TemperatureModel::new(20.0, 15.0, 0.0);
        let a = model.temperature_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let b = model.temperature_at(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn noise_is_bounded_and_varies_between_samples() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp() as f64;
        let samples: Vec<f64> = (0..1000).map(|i| noise(start + i as f64 * 0.05)).collect();
        assert!(samples.iter().all(|n| n.abs() <= NOISE_AMPLITUDE));
        assert!(samples.windows(2).any(|w| w[0] != w[1]));
        assert_eq!(noise(start), noise(start));
    }

    #[test]
    fn same_day_shares_offset() {
        assert_eq!(daily_offset(19_000.0), daily_offset(19_000.0));
        assert_ne!(daily_offset(19_000.0), daily_offset(19_001.0));
    }
}
