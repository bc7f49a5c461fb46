use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::telemetry::TelemetryReading;

/// Amount added to every reading while the device simulates overheating
pub const OVERHEAT_OFFSET: f64 = 100.0;

/// Longest accepted telemetry interval
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("telemetry interval must be greater than zero")]
    ZeroInterval,

    #[error("telemetry interval must not exceed {}s", MAX_INTERVAL.as_secs())]
    IntervalTooLong,

    #[error("temperature bounds must be finite numbers")]
    NonFinite,

    #[error("temperature low bound ({low}) is greater than the high bound ({high})")]
    InvalidRange { low: f64, high: f64 },
}

/// Telemetry configuration. Can only be changed while the device
/// is disconnected.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetrySettings {
    /// Time between readings
    pub interval: Duration,

    pub temperature_low: f64,
    pub temperature_high: f64,

    /// Report this value instead of sampling from the range
    pub fixed_temperature: Option<f64>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            temperature_low: -20.0,
            temperature_high: -15.0,
            fixed_temperature: None,
        }
    }
}

impl TelemetrySettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.interval.is_zero() {
            return Err(SettingsError::ZeroInterval);
        }
        if self.interval > MAX_INTERVAL {
            return Err(SettingsError::IntervalTooLong);
        }

        let (low, high) = (self.temperature_low, self.temperature_high);
        if !low.is_finite()
            || !high.is_finite()
            || self.fixed_temperature.is_some_and(|t| !t.is_finite())
        {
            return Err(SettingsError::NonFinite);
        }

        if low > high {
            return Err(SettingsError::InvalidRange { low, high });
        }

        Ok(())
    }
}

/// Overheat toggle shared between the shell and the running telemetry.
///
/// Unlike the rest of the settings, it can be flipped while connected and
/// takes effect on the next reading.
#[derive(Clone, Debug, Default)]
pub struct Overheat(Arc<AtomicBool>);

impl Overheat {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug)]
enum Source {
    Range { low: f64, high: f64 },
    Fixed(f64),
}

/// Produces synthetic temperature readings
#[derive(Clone, Debug)]
pub struct Sampler {
    source: Source,
    overheat: Overheat,
}

impl Sampler {
    pub fn new(settings: &TelemetrySettings, overheat: Overheat) -> Self {
        let source = match settings.fixed_temperature {
            Some(temperature) => Source::Fixed(temperature),
            None => Source::Range {
                low: settings.temperature_low,
                high: settings.temperature_high,
            },
        };
        Self { source, overheat }
    }

    pub fn sample(&self) -> TelemetryReading {
        let temperature = match self.source {
            Source::Fixed(temperature) => temperature,
            Source::Range { low, high } => low + rand::random::<f64>() * (high - low),
        };

        let reading = TelemetryReading::new(temperature);
        if self.overheat.is_enabled() {
            reading.with_offset(OVERHEAT_OFFSET)
        } else {
            reading
        }
    }
}
