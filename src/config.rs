//! # Oven Configuration
//!
//! This module defines the configuration for the control loop, the sensor
//! filter, the non-volatile storage image, the built-in defaults used when
//! persisted data fails validation, and the simulated oven.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [control]
//! min_interval_ms = 500
//! sensor_floor_c = 5.0
//!
//! [storage]
//! path = "oven.eeprom"
//! capacity = 1024
//!
//! [defaults.constants]
//! kp = 1.0
//! kd = 22.0
//!
//! [simulation]
//! ambient_c = 22.0
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::reflow::profile::ReflowProfile;
use crate::storage::store::PROFILES_REGION_LEN;
use crate::temperature::constants::ControllerConstants;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the oven.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Control loop timing and fault policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    /// Minimum spacing between two controller evaluations.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Readings below this are treated as a missing sensor.
    #[serde(default = "default_sensor_floor_c")]
    pub sensor_floor_c: f64,
    /// Abort a running profile once a sensor fault has lasted this long.
    /// Unset means the run waits for readings to resume indefinitely.
    #[serde(default)]
    pub sensor_fault_timeout_s: Option<f64>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            sensor_floor_c: default_sensor_floor_c(),
            sensor_fault_timeout_s: None,
        }
    }
}

impl ControlConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Thermocouple read filter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorConfig {
    #[serde(default = "default_min_read_interval_ms")]
    pub min_read_interval_ms: u64,
    #[serde(default = "default_min_plausible_c")]
    pub min_plausible_c: f64,
    #[serde(default = "default_max_plausible_c")]
    pub max_plausible_c: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            min_read_interval_ms: default_min_read_interval_ms(),
            min_plausible_c: default_min_plausible_c(),
            max_plausible_c: default_max_plausible_c(),
        }
    }
}

/// Non-volatile storage image layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub constants_address: usize,
    #[serde(default = "default_profiles_address")]
    pub profiles_address: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            capacity: default_capacity(),
            constants_address: 0,
            profiles_address: default_profiles_address(),
        }
    }
}

/// Built-in values substituted for invalid persisted data.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub constants: ControllerConstants,
    #[serde(default)]
    pub profile: ReflowProfile,
}

/// Thermal model for running without hardware.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_ambient_c")]
    pub ambient_c: f64,
    #[serde(default = "default_heater_rate")]
    pub heater_rate_c_per_s: f64,
    #[serde(default = "default_loss_coefficient")]
    pub loss_coefficient: f64,
    #[serde(default = "default_noise_c")]
    pub noise_c: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ambient_c: default_ambient_c(),
            heater_rate_c_per_s: default_heater_rate(),
            loss_coefficient: default_loss_coefficient(),
            noise_c: default_noise_c(),
            seed: None,
        }
    }
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.min_interval_ms == 0 {
            return Err(ConfigError::Invalid("control.min_interval_ms must be > 0".to_string()));
        }
        if !self.control.sensor_floor_c.is_finite() {
            return Err(ConfigError::Invalid("control.sensor_floor_c must be finite".to_string()));
        }
        if let Some(timeout) = self.control.sensor_fault_timeout_s {
            if !(timeout > 0.0) {
                return Err(ConfigError::Invalid(
                    "control.sensor_fault_timeout_s must be > 0".to_string(),
                ));
            }
        }
        if self.sensor.min_plausible_c >= self.sensor.max_plausible_c {
            return Err(ConfigError::Invalid(
                "sensor.min_plausible_c must be below sensor.max_plausible_c".to_string(),
            ));
        }
        let constants_end = self.storage.constants_address + ControllerConstants::ENCODED_LEN;
        let profiles_end = self.storage.profiles_address + PROFILES_REGION_LEN;
        if self.storage.profiles_address < constants_end
            && self.storage.constants_address < profiles_end
        {
            return Err(ConfigError::Invalid(format!(
                "storage.profiles_address {} overlaps the constants region ending at {}",
                self.storage.profiles_address, constants_end
            )));
        }
        if let Err(e) = self.defaults.constants.validate() {
            return Err(ConfigError::Invalid(format!("defaults.constants: {}", e)));
        }
        if let Err(e) = self.defaults.profile.validate() {
            return Err(ConfigError::Invalid(format!("defaults.profile: {}", e)));
        }
        if self.simulation.heater_rate_c_per_s <= 0.0 || self.simulation.loss_coefficient < 0.0 {
            return Err(ConfigError::Invalid(
                "simulation heater rate must be > 0 and loss coefficient >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_min_interval_ms() -> u64 { 500 }
fn default_sensor_floor_c() -> f64 { 5.0 }
fn default_min_read_interval_ms() -> u64 { 400 }
fn default_min_plausible_c() -> f64 { 1.0 }
fn default_max_plausible_c() -> f64 { 1000.0 }
fn default_storage_path() -> PathBuf { PathBuf::from("oven.eeprom") }
fn default_capacity() -> usize { 1024 }
fn default_profiles_address() -> usize { ControllerConstants::ENCODED_LEN }
fn default_ambient_c() -> f64 { 22.0 }
fn default_heater_rate() -> f64 { 2.5 }
fn default_loss_coefficient() -> f64 { 0.005 }
fn default_noise_c() -> f64 { 0.2 }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}
