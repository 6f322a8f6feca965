// src/hardware/mod.rs - Trait-based interfaces for the oven's I/O
pub mod sensor;
pub mod simulator;

use std::time::Instant;
use thiserror::Error;

pub use sensor::FilteredSensor;
pub use simulator::{OvenHandle, SimulatedClock, SimulatedOven, Simulation};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    #[error("Temperature read failed: {0}")]
    ReadFailure(String),
    #[error("Implausible temperature reading: {0}°C")]
    Implausible(f64),
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("Output '{output}' failed: {reason}")]
pub struct OutputError {
    pub output: &'static str,
    pub reason: String,
}

/// Thermocouple (or any other single temperature input).
pub trait TemperatureSensor {
    fn read_temperature(&mut self) -> Result<f64, SensorError>;
}

/// Source of monotonic seconds.
pub trait TimeInterface {
    fn now_seconds(&self) -> f64;
}

/// Heater and fan relays.
pub trait OvenOutputs {
    fn set_heater(&mut self, on: bool) -> Result<(), OutputError>;
    fn set_fan(&mut self, on: bool) -> Result<(), OutputError>;
}

/// Monotonic clock anchored at construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeInterface for SystemClock {
    fn now_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl<T: TimeInterface + ?Sized> TimeInterface for &T {
    fn now_seconds(&self) -> f64 {
        (**self).now_seconds()
    }
}
