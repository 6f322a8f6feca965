// src/hardware/simulator.rs - Thermal model of the oven for running without hardware
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{OutputError, OvenOutputs, SensorError, TemperatureSensor, TimeInterface};
use crate::config::SimulationConfig;

/// Extra heat loss factor while the convection fan runs.
const FAN_LOSS_FACTOR: f64 = 1.5;

/// Lumped thermal model: the heater adds a fixed rate, the chamber loses heat
/// to ambient in proportion to the temperature difference.
#[derive(Debug)]
pub struct SimulatedOven {
    pub temperature: f64,
    pub heater_on: bool,
    pub fan_on: bool,
    /// When false the thermocouple reads as open.
    pub sensor_connected: bool,
    ambient: f64,
    heater_rate: f64,
    loss_coefficient: f64,
    noise: f64,
    rng: StdRng,
}

impl SimulatedOven {
    pub fn new(config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            temperature: config.ambient_c,
            heater_on: false,
            fan_on: false,
            sensor_connected: true,
            ambient: config.ambient_c,
            heater_rate: config.heater_rate_c_per_s,
            loss_coefficient: config.loss_coefficient,
            noise: config.noise_c,
            rng,
        }
    }

    pub fn ambient(&self) -> f64 {
        self.ambient
    }

    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let gain = if self.heater_on { self.heater_rate * dt } else { 0.0 };
        let factor = if self.fan_on { FAN_LOSS_FACTOR } else { 1.0 };
        let loss = self.loss_coefficient * factor * (self.temperature - self.ambient) * dt;
        self.temperature += gain - loss;
    }

    pub fn measure(&mut self) -> Result<f64, SensorError> {
        if !self.sensor_connected {
            return Err(SensorError::ReadFailure("thermocouple open".to_string()));
        }
        let jitter = if self.noise > 0.0 {
            self.noise * (self.rng.random::<f64>() - 0.5)
        } else {
            0.0
        };
        Ok(self.temperature + jitter)
    }
}

/// Manually advanced clock.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    now: Rc<Cell<f64>>,
}

impl SimulatedClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }
}

impl TimeInterface for SimulatedClock {
    fn now_seconds(&self) -> f64 {
        self.now.get()
    }
}

/// Shared handle to a [`SimulatedOven`], usable as both the sensor and the
/// outputs of an orchestrator.
#[derive(Debug, Clone)]
pub struct OvenHandle(Rc<RefCell<SimulatedOven>>);

impl OvenHandle {
    pub fn new(oven: SimulatedOven) -> Self {
        Self(Rc::new(RefCell::new(oven)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimulatedOven) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

impl TemperatureSensor for OvenHandle {
    fn read_temperature(&mut self) -> Result<f64, SensorError> {
        self.0.borrow_mut().measure()
    }
}

impl OvenOutputs for OvenHandle {
    fn set_heater(&mut self, on: bool) -> Result<(), OutputError> {
        self.0.borrow_mut().heater_on = on;
        Ok(())
    }

    fn set_fan(&mut self, on: bool) -> Result<(), OutputError> {
        self.0.borrow_mut().fan_on = on;
        Ok(())
    }
}

/// Oven model plus the clock it runs against.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub oven: OvenHandle,
    pub clock: SimulatedClock,
}

impl Simulation {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            oven: OvenHandle::new(SimulatedOven::new(config)),
            clock: SimulatedClock::new(0.0),
        }
    }

    /// Advance simulated time and the thermal model together.
    pub fn advance(&self, dt: f64) {
        self.oven.with(|oven| oven.step(dt));
        self.clock.advance(dt);
    }

    pub fn temperature(&self) -> f64 {
        self.oven.with(|oven| oven.temperature)
    }
}
