// src/temperature/mod.rs - Heater control: gains, the PID filter, tracing and tuning
pub mod constants;
pub mod controller;
pub mod trace;
pub mod tuning;

pub use constants::ControllerConstants;
pub use controller::{ControllerState, TemperatureController, TemperatureStatus};
pub use trace::TraceWriter;
pub use tuning::{ConstantsTuner, TuningItem};
