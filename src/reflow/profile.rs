// src/reflow/profile.rs - Reflow recipes and their persisted form
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;
use crate::validation::{check_range, ValidationError};

pub const MIN_TEMP_C: i32 = 80;
pub const MAX_TEMP_C: i32 = 300;
pub const MIN_TIME_S: i32 = 0;
pub const MAX_TIME_S: i32 = 60 * 10;
pub const MIN_TOTAL_RUNTIME_S: i32 = 30;
/// Number of profiles held by the profile store.
pub const PROFILE_SLOTS: usize = 10;
/// Bytes reserved for a profile name in its persisted record.
pub const NAME_LEN: usize = 16;

/// One reflow recipe. Temperatures in °C, durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReflowProfile {
    #[serde(default = "default_fan_on")]
    pub fan_on: bool,
    #[serde(default = "default_preheat_temp_c")]
    pub preheat_temp_c: i32,
    #[serde(default = "default_preheat_time_s")]
    pub preheat_time_s: i32,
    #[serde(default = "default_soak_temp_c")]
    pub soak_temp_c: i32,
    #[serde(default = "default_soak_time_s")]
    pub soak_time_s: i32,
    #[serde(default = "default_reflow_temp_c")]
    pub reflow_temp_c: i32,
    #[serde(default)]
    pub reflow_hold_time_s: i32,
}

fn default_fan_on() -> bool { true }
fn default_preheat_temp_c() -> i32 { 125 }
fn default_preheat_time_s() -> i32 { 90 }
fn default_soak_temp_c() -> i32 { 190 }
fn default_soak_time_s() -> i32 { 180 }
fn default_reflow_temp_c() -> i32 { 225 }

impl Default for ReflowProfile {
    fn default() -> Self {
        Self {
            fan_on: default_fan_on(),
            preheat_temp_c: default_preheat_temp_c(),
            preheat_time_s: default_preheat_time_s(),
            soak_temp_c: default_soak_temp_c(),
            soak_time_s: default_soak_time_s(),
            reflow_temp_c: default_reflow_temp_c(),
            reflow_hold_time_s: 0,
        }
    }
}

/// Editable field of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    PreheatTemp,
    PreheatTime,
    SoakTemp,
    SoakTime,
    ReflowTemp,
    HoldTime,
    FanOn,
}

impl ProfileField {
    pub const ALL: [ProfileField; 7] = [
        ProfileField::PreheatTemp,
        ProfileField::PreheatTime,
        ProfileField::SoakTemp,
        ProfileField::SoakTime,
        ProfileField::ReflowTemp,
        ProfileField::HoldTime,
        ProfileField::FanOn,
    ];

    fn bounds(self) -> (i32, i32) {
        match self {
            ProfileField::PreheatTemp | ProfileField::SoakTemp | ProfileField::ReflowTemp => {
                (MIN_TEMP_C, MAX_TEMP_C)
            }
            ProfileField::PreheatTime | ProfileField::SoakTime | ProfileField::HoldTime => {
                (MIN_TIME_S, MAX_TIME_S)
            }
            ProfileField::FanOn => (0, 1),
        }
    }
}

impl ReflowProfile {
    /// Size of the persisted record: fan flag byte plus six little-endian `i32`.
    pub const ENCODED_LEN: usize = 1 + 6 * 4;

    /// Preheat plus soak; the reflow phase starts after this.
    pub fn ramp_duration_s(&self) -> i32 {
        self.preheat_time_s + self.soak_time_s
    }

    pub fn total_runtime_s(&self) -> i64 {
        self.preheat_time_s as i64 + self.soak_time_s as i64 + self.reflow_hold_time_s as i64
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let temps = [
            ("preheat_temp_c", self.preheat_temp_c),
            ("soak_temp_c", self.soak_temp_c),
            ("reflow_temp_c", self.reflow_temp_c),
        ];
        for (field, value) in temps {
            check_range(field, value as f64, MIN_TEMP_C as f64, MAX_TEMP_C as f64)?;
        }
        let times = [
            ("preheat_time_s", self.preheat_time_s),
            ("soak_time_s", self.soak_time_s),
            ("reflow_hold_time_s", self.reflow_hold_time_s),
        ];
        for (field, value) in times {
            check_range(field, value as f64, MIN_TIME_S as f64, MAX_TIME_S as f64)?;
        }
        if self.preheat_temp_c > self.soak_temp_c {
            return Err(ValidationError::NotMonotonic {
                lower: "preheat_temp_c",
                upper: "soak_temp_c",
            });
        }
        if self.soak_temp_c > self.reflow_temp_c {
            return Err(ValidationError::NotMonotonic {
                lower: "soak_temp_c",
                upper: "reflow_temp_c",
            });
        }
        if self.total_runtime_s() < MIN_TOTAL_RUNTIME_S as i64 {
            return Err(ValidationError::RuntimeTooShort {
                total: self.total_runtime_s(),
                min: MIN_TOTAL_RUNTIME_S as i64,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Move `field` by `delta` units, saturating at the field's range.
    /// The fan flag toggles for any non-zero delta.
    pub fn adjust(&mut self, field: ProfileField, delta: i32) {
        let (min, max) = field.bounds();
        let slot = match field {
            ProfileField::FanOn => {
                if delta != 0 {
                    self.fan_on = !self.fan_on;
                }
                return;
            }
            ProfileField::PreheatTemp => &mut self.preheat_temp_c,
            ProfileField::PreheatTime => &mut self.preheat_time_s,
            ProfileField::SoakTemp => &mut self.soak_temp_c,
            ProfileField::SoakTime => &mut self.soak_time_s,
            ProfileField::ReflowTemp => &mut self.reflow_temp_c,
            ProfileField::HoldTime => &mut self.reflow_hold_time_s,
        };
        *slot = slot.saturating_add(delta).clamp(min, max);
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        bytes[0] = self.fan_on as u8;
        let values = [
            self.preheat_temp_c,
            self.preheat_time_s,
            self.soak_temp_c,
            self.soak_time_s,
            self.reflow_temp_c,
            self.reflow_hold_time_s,
        ];
        for (chunk, value) in bytes[1..].chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(StorageError::CorruptData(format!(
                "profile record is {} bytes, expected {}",
                bytes.len(),
                Self::ENCODED_LEN
            )));
        }
        let fan_on = match bytes[0] {
            0 => false,
            1 => true,
            other => {
                return Err(StorageError::CorruptData(format!(
                    "fan flag byte {:#04x} is not a boolean",
                    other
                )));
            }
        };
        let mut values = [0i32; 6];
        for (value, chunk) in values.iter_mut().zip(bytes[1..].chunks_exact(4)) {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(chunk);
            *value = i32::from_le_bytes(raw);
        }
        Ok(Self {
            fan_on,
            preheat_temp_c: values[0],
            preheat_time_s: values[1],
            soak_temp_c: values[2],
            soak_time_s: values[3],
            reflow_temp_c: values[4],
            reflow_hold_time_s: values[5],
        })
    }
}

/// A profile together with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSlot {
    pub name: String,
    pub profile: ReflowProfile,
}

impl ProfileSlot {
    pub const ENCODED_LEN: usize = NAME_LEN + ReflowProfile::ENCODED_LEN;

    pub fn new(name: impl Into<String>, profile: ReflowProfile) -> Self {
        Self {
            name: name.into(),
            profile,
        }
    }

    /// Slot holding `profile` under the default name for `index`.
    pub fn default_for(index: usize, profile: ReflowProfile) -> Self {
        Self::new(format!("Profile {}", index + 1), profile)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::InvalidName("empty".to_string()));
        }
        if self.name.len() > NAME_LEN {
            return Err(ValidationError::InvalidName(format!(
                "'{}' is longer than {} bytes",
                self.name, NAME_LEN
            )));
        }
        if self.name.contains('\0') {
            return Err(ValidationError::InvalidName("contains NUL".to_string()));
        }
        self.profile.validate()
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Encode the slot. Names longer than [`NAME_LEN`] are truncated; callers
    /// validate first.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        let name = self.name.as_bytes();
        let len = name.len().min(NAME_LEN);
        bytes[..len].copy_from_slice(&name[..len]);
        bytes[NAME_LEN..].copy_from_slice(&self.profile.encode());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(StorageError::CorruptData(format!(
                "profile slot is {} bytes, expected {}",
                bytes.len(),
                Self::ENCODED_LEN
            )));
        }
        let raw_name = &bytes[..NAME_LEN];
        let end = raw_name.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
        let name = std::str::from_utf8(&raw_name[..end])
            .map_err(|e| StorageError::CorruptData(format!("profile name: {}", e)))?
            .to_string();
        let profile = ReflowProfile::decode(&bytes[NAME_LEN..])?;
        Ok(Self { name, profile })
    }
}

/// The fixed set of profiles available for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLibrary {
    slots: Vec<ProfileSlot>,
}

impl ProfileLibrary {
    /// Library with every slot holding `profile`.
    pub fn filled_with(profile: ReflowProfile) -> Self {
        Self {
            slots: (0..PROFILE_SLOTS)
                .map(|i| ProfileSlot::default_for(i, profile))
                .collect(),
        }
    }

    /// Build a library from exactly [`PROFILE_SLOTS`] slots.
    pub fn from_slots(slots: Vec<ProfileSlot>) -> Option<Self> {
        (slots.len() == PROFILE_SLOTS).then_some(Self { slots })
    }

    pub fn get(&self, index: usize) -> Option<&ProfileSlot> {
        self.slots.get(index)
    }

    /// Replace slot `index`; returns false if the index is out of range.
    pub fn set(&mut self, index: usize, slot: ProfileSlot) -> bool {
        match self.slots.get_mut(index) {
            Some(existing) => {
                *existing = slot;
                true
            }
            None => false,
        }
    }

    pub fn slots(&self) -> &[ProfileSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for ProfileLibrary {
    fn default() -> Self {
        Self::filled_with(ReflowProfile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_valid() {
        let profile = ReflowProfile::default();
        assert!(profile.is_valid());
        assert_eq!(profile.ramp_duration_s(), 270);
        assert_eq!(profile.total_runtime_s(), 270);
    }

    #[test]
    fn test_rejects_non_monotonic_temperatures() {
        let profile = ReflowProfile {
            preheat_temp_c: 200,
            soak_temp_c: 150,
            reflow_temp_c: 180,
            ..ReflowProfile::default()
        };
        assert!(!profile.is_valid());
        assert_eq!(
            profile.validate(),
            Err(ValidationError::NotMonotonic {
                lower: "preheat_temp_c",
                upper: "soak_temp_c"
            })
        );

        let profile = ReflowProfile {
            soak_temp_c: 240,
            ..ReflowProfile::default()
        };
        assert!(matches!(
            profile.validate(),
            Err(ValidationError::NotMonotonic { lower: "soak_temp_c", .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        let cold = ReflowProfile {
            preheat_temp_c: MIN_TEMP_C - 1,
            ..ReflowProfile::default()
        };
        assert!(!cold.is_valid());
        let hot = ReflowProfile {
            reflow_temp_c: MAX_TEMP_C + 1,
            ..ReflowProfile::default()
        };
        assert!(!hot.is_valid());
        let long = ReflowProfile {
            soak_time_s: MAX_TIME_S + 1,
            ..ReflowProfile::default()
        };
        assert!(!long.is_valid());
        let negative = ReflowProfile {
            reflow_hold_time_s: -1,
            ..ReflowProfile::default()
        };
        assert!(!negative.is_valid());
    }

    #[test]
    fn test_rejects_short_total_runtime() {
        let profile = ReflowProfile {
            preheat_time_s: 10,
            soak_time_s: 10,
            reflow_hold_time_s: 9,
            ..ReflowProfile::default()
        };
        assert_eq!(
            profile.validate(),
            Err(ValidationError::RuntimeTooShort { total: 29, min: 30 })
        );
        let profile = ReflowProfile {
            reflow_hold_time_s: 10,
            ..profile
        };
        assert!(profile.is_valid());
    }

    #[test]
    fn test_adjust_saturates_and_toggles() {
        let mut profile = ReflowProfile::default();
        profile.adjust(ProfileField::ReflowTemp, 1);
        assert_eq!(profile.reflow_temp_c, 226);
        profile.adjust(ProfileField::HoldTime, -1);
        assert_eq!(profile.reflow_hold_time_s, 0);
        profile.adjust(ProfileField::ReflowTemp, 1000);
        assert_eq!(profile.reflow_temp_c, MAX_TEMP_C);
        profile.adjust(ProfileField::FanOn, 1);
        assert!(!profile.fan_on);
        profile.adjust(ProfileField::FanOn, -1);
        assert!(profile.fan_on);
    }

    #[test]
    fn test_decode_rejects_bad_fan_flag() {
        let mut bytes = ReflowProfile::default().encode();
        bytes[0] = 0xFF;
        assert!(matches!(
            ReflowProfile::decode(&bytes),
            Err(StorageError::CorruptData(_))
        ));
    }

    #[test]
    fn test_slot_name_validation() {
        let slot = ProfileSlot::new("", ReflowProfile::default());
        assert!(!slot.is_valid());
        let slot = ProfileSlot::new("a name that is far too long", ReflowProfile::default());
        assert!(!slot.is_valid());
        let slot = ProfileSlot::default_for(9, ReflowProfile::default());
        assert_eq!(slot.name, "Profile 10");
        assert!(slot.is_valid());
    }

    #[test]
    fn test_slot_decode_trims_padding() {
        let slot = ProfileSlot::new("Lead-free", ReflowProfile::default());
        let decoded = ProfileSlot::decode(&slot.encode()).unwrap();
        assert_eq!(decoded, slot);
    }

    #[test]
    fn test_library_has_fixed_size() {
        let library = ProfileLibrary::default();
        assert_eq!(library.len(), PROFILE_SLOTS);
        assert!(ProfileLibrary::from_slots(vec![]).is_none());
        let mut library = library;
        assert!(!library.set(PROFILE_SLOTS, ProfileSlot::default_for(0, ReflowProfile::default())));
    }
}
