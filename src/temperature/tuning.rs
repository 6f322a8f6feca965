// src/temperature/tuning.rs - Interactive adjustment of controller constants
use thiserror::Error;

use super::constants::{ControllerConstants, MAX_CONSTANTS_VALUE, MIN_CONSTANTS_VALUE};
use crate::storage::store::ConstantsStore;
use crate::storage::StorageError;
use crate::validation::ValidationError;

pub const MIN_TUNING_STEP: f64 = 0.1;
pub const MAX_TUNING_STEP: f64 = 100.0;
const STEP_GROWTH: f64 = 1.0;
const STEP_SHRINK: f64 = 0.1;

#[derive(Debug, Error)]
pub enum TuningError {
    #[error("Constants rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("Failed to persist constants: {0}")]
    Storage(#[from] StorageError),
}

/// Item selected in the tuning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningItem {
    Kp,
    Ki,
    Kd,
    Threshold,
    Step,
}

impl TuningItem {
    pub const ALL: [TuningItem; 5] = [
        TuningItem::Kp,
        TuningItem::Ki,
        TuningItem::Kd,
        TuningItem::Threshold,
        TuningItem::Step,
    ];
}

/// Draft copy of the constants plus the current adjustment step.
#[derive(Debug, Clone)]
pub struct ConstantsTuner {
    original: ControllerConstants,
    draft: ControllerConstants,
    selected: TuningItem,
    step: f64,
}

impl ConstantsTuner {
    pub fn new(current: ControllerConstants) -> Self {
        Self {
            original: current,
            draft: current,
            selected: TuningItem::Kp,
            step: 1.0,
        }
    }

    pub fn draft(&self) -> &ControllerConstants {
        &self.draft
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn selected(&self) -> TuningItem {
        self.selected
    }

    pub fn select(&mut self, item: TuningItem) {
        self.selected = item;
    }

    pub fn increment(&mut self) {
        match self.selected {
            TuningItem::Step => self.adjust_step(STEP_GROWTH),
            item => self.adjust_gain(item, self.step),
        }
    }

    pub fn decrement(&mut self) {
        match self.selected {
            TuningItem::Step => self.adjust_step(-STEP_SHRINK),
            item => self.adjust_gain(item, -self.step),
        }
    }

    fn adjust_step(&mut self, delta: f64) {
        self.step = (self.step + delta).clamp(MIN_TUNING_STEP, MAX_TUNING_STEP);
    }

    fn adjust_gain(&mut self, item: TuningItem, delta: f64) {
        let field = match item {
            TuningItem::Kp => &mut self.draft.kp,
            TuningItem::Ki => &mut self.draft.ki,
            TuningItem::Kd => &mut self.draft.kd,
            TuningItem::Threshold => &mut self.draft.threshold,
            TuningItem::Step => return,
        };
        *field = (*field + delta).clamp(MIN_CONSTANTS_VALUE, MAX_CONSTANTS_VALUE);
    }

    /// Validate the draft and persist it at `address`. On success the caller
    /// should install the returned constants in the controller; on failure
    /// the previously persisted copy is left untouched.
    pub fn save<S: ConstantsStore + ?Sized>(
        &self,
        store: &mut S,
        address: usize,
    ) -> Result<ControllerConstants, TuningError> {
        self.draft.validate()?;
        store.save_constants(address, &self.draft)?;
        tracing::info!("Saved controller constants at address {}", address);
        Ok(self.draft)
    }

    /// Drop the draft and hand back the constants the session started from.
    pub fn cancel(self) -> ControllerConstants {
        self.original
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, store::NonVolatileStore};

    #[test]
    fn test_adjust_selected_gain() {
        let mut tuner = ConstantsTuner::new(ControllerConstants::default());
        tuner.increment();
        assert_eq!(tuner.draft().kp, 2.0);
        tuner.select(TuningItem::Kd);
        tuner.decrement();
        assert_eq!(tuner.draft().kd, 21.0);
    }

    #[test]
    fn test_cancel_discards_draft() {
        let mut tuner = ConstantsTuner::new(ControllerConstants::default());
        tuner.select(TuningItem::Kd);
        tuner.increment();
        assert_eq!(tuner.cancel(), ControllerConstants::default());
    }

    #[test]
    fn test_gain_cannot_go_negative() {
        let mut tuner = ConstantsTuner::new(ControllerConstants::default());
        tuner.select(TuningItem::Ki);
        tuner.decrement();
        assert_eq!(tuner.draft().ki, 0.0);
        assert!(tuner.draft().is_valid());
    }

    #[test]
    fn test_step_is_clamped() {
        let mut tuner = ConstantsTuner::new(ControllerConstants::default());
        tuner.select(TuningItem::Step);
        for _ in 0..500 {
            tuner.increment();
        }
        assert_eq!(tuner.step(), MAX_TUNING_STEP);
        for _ in 0..5000 {
            tuner.decrement();
        }
        assert_eq!(tuner.step(), MIN_TUNING_STEP);
    }

    #[test]
    fn test_gain_saturates_at_upper_bound() {
        let mut tuner = ConstantsTuner::new(ControllerConstants::default());
        tuner.select(TuningItem::Step);
        for _ in 0..200 {
            tuner.increment();
        }
        tuner.select(TuningItem::Threshold);
        for _ in 0..20 {
            tuner.increment();
        }
        assert_eq!(tuner.draft().threshold, MAX_CONSTANTS_VALUE);
    }

    #[test]
    fn test_save_persists_draft() {
        let mut store = NonVolatileStore::new(MemoryStorage::new(256), 0, 32);
        let mut tuner = ConstantsTuner::new(ControllerConstants::default());
        tuner.increment();
        let saved = tuner.save(&mut store, 0).unwrap();
        assert_eq!(store.load_constants(0).unwrap(), saved);
    }

    #[test]
    fn test_save_reports_capacity_error() {
        let mut store = NonVolatileStore::new(MemoryStorage::new(16), 0, 32);
        let tuner = ConstantsTuner::new(ControllerConstants::default());
        assert!(matches!(
            tuner.save(&mut store, 0),
            Err(TuningError::Storage(StorageError::CapacityExceeded { .. }))
        ));
    }
}
