// src/temperature/constants.rs - PID gains and the heater switching threshold
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;
use crate::validation::{check_range, ValidationError};

pub const MIN_CONSTANTS_VALUE: f64 = 0.0;
pub const MAX_CONSTANTS_VALUE: f64 = 1000.0;

/// Gains and output threshold for the heater controller.
///
/// All four fields must be finite and inside
/// [`MIN_CONSTANTS_VALUE`, `MAX_CONSTANTS_VALUE`]; a single bad field
/// invalidates the whole set.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ControllerConstants {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_ki")]
    pub ki: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    /// Controller output above this energizes the heater.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_kp() -> f64 { 1.0 }
fn default_ki() -> f64 { 0.0 }
fn default_kd() -> f64 { 22.0 }
fn default_threshold() -> f64 { 0.1 }

impl Default for ControllerConstants {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
            threshold: default_threshold(),
        }
    }
}

impl ControllerConstants {
    /// Size of the persisted record: four little-endian `f64`.
    pub const ENCODED_LEN: usize = 32;

    pub fn new(kp: f64, ki: f64, kd: f64, threshold: f64) -> Self {
        Self { kp, ki, kd, threshold }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("kp", self.kp),
            ("ki", self.ki),
            ("kd", self.kd),
            ("threshold", self.threshold),
        ] {
            check_range(field, value, MIN_CONSTANTS_VALUE, MAX_CONSTANTS_VALUE)?;
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        for (chunk, value) in bytes
            .chunks_exact_mut(8)
            .zip([self.kp, self.ki, self.kd, self.threshold])
        {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Decode a persisted record. Any bit pattern decodes; range checking is
    /// left to [`ControllerConstants::validate`].
    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(StorageError::CorruptData(format!(
                "constants record is {} bytes, expected {}",
                bytes.len(),
                Self::ENCODED_LEN
            )));
        }
        let mut values = [0.0f64; 4];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *value = f64::from_le_bytes(raw);
        }
        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }
}
