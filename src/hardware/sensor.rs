// src/hardware/sensor.rs - Plausibility filter and read pacing for the thermocouple
use super::{SensorError, TemperatureSensor};
use crate::config::SensorConfig;

/// Wraps a raw sensor, rejecting readings outside the plausible band and
/// serving the last good value when polled faster than the converter can
/// produce new samples.
#[derive(Debug)]
pub struct FilteredSensor<S> {
    inner: S,
    min_read_interval: f64,
    min_plausible_c: f64,
    max_plausible_c: f64,
    last_read_at: Option<f64>,
    last_good: Option<f64>,
}

impl<S: TemperatureSensor> FilteredSensor<S> {
    pub fn new(inner: S, config: &SensorConfig) -> Self {
        Self {
            inner,
            min_read_interval: config.min_read_interval_ms as f64 / 1000.0,
            min_plausible_c: config.min_plausible_c,
            max_plausible_c: config.max_plausible_c,
            last_read_at: None,
            last_good: None,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Read the sensor at time `now` (seconds).
    pub fn read(&mut self, now: f64) -> Result<f64, SensorError> {
        if let (Some(at), Some(value)) = (self.last_read_at, self.last_good) {
            let since = now - at;
            if since >= 0.0 && since < self.min_read_interval {
                return Ok(value);
            }
        }
        self.last_read_at = Some(now);
        let result = self.inner.read_temperature().and_then(|value| {
            if !value.is_finite() || value <= self.min_plausible_c || value > self.max_plausible_c {
                Err(SensorError::Implausible(value))
            } else {
                Ok(value)
            }
        });
        match &result {
            Ok(value) => self.last_good = Some(*value),
            Err(e) => {
                tracing::debug!("Thermocouple read rejected: {}", e);
                self.last_good = None;
            }
        }
        result
    }
}
