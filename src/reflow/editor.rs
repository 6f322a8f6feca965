// src/reflow/editor.rs - Field-by-field editing of a stored profile
use thiserror::Error;

use super::profile::{ProfileField, ProfileLibrary, ProfileSlot};
use crate::storage::StorageError;
use crate::storage::store::ProfileStore;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("No profile in slot {0}")]
    NoSuchSlot(usize),
    #[error("Profile rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("Failed to persist profiles: {0}")]
    Storage(#[from] StorageError),
}

/// Draft of one library slot. Nothing reaches the library or the store
/// until [`ProfileEditor::save`].
#[derive(Debug, Clone)]
pub struct ProfileEditor {
    index: usize,
    draft: ProfileSlot,
    selected: ProfileField,
}

impl ProfileEditor {
    pub fn open(library: &ProfileLibrary, index: usize) -> Result<Self, EditError> {
        let slot = library.get(index).ok_or(EditError::NoSuchSlot(index))?;
        Ok(Self {
            index,
            draft: slot.clone(),
            selected: ProfileField::PreheatTemp,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn draft(&self) -> &ProfileSlot {
        &self.draft
    }

    pub fn selected(&self) -> ProfileField {
        self.selected
    }

    pub fn select(&mut self, field: ProfileField) {
        self.selected = field;
    }

    /// Select the next field, wrapping around.
    pub fn select_next(&mut self) {
        let pos = ProfileField::ALL
            .iter()
            .position(|f| *f == self.selected)
            .unwrap_or(0);
        self.selected = ProfileField::ALL[(pos + 1) % ProfileField::ALL.len()];
    }

    pub fn increment(&mut self) {
        self.draft.profile.adjust(self.selected, 1);
    }

    pub fn decrement(&mut self) {
        self.draft.profile.adjust(self.selected, -1);
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.draft.name = name.into();
    }

    /// Validate the draft, write it into `library` and persist the whole
    /// library. A storage failure leaves the in-memory library updated and
    /// the persisted copy untouched.
    pub fn save<S: ProfileStore + ?Sized>(
        self,
        library: &mut ProfileLibrary,
        store: &mut S,
    ) -> Result<(), EditError> {
        self.draft.validate()?;
        if !library.set(self.index, self.draft) {
            return Err(EditError::NoSuchSlot(self.index));
        }
        store.save_profiles(library)?;
        tracing::info!("Saved profile slot {}", self.index);
        Ok(())
    }

    /// Discard the draft and restore the slot from the store.
    pub fn cancel<S: ProfileStore + ?Sized>(
        self,
        library: &mut ProfileLibrary,
        store: &S,
    ) -> Result<(), EditError> {
        let stored = store.load_profile(self.index)?;
        library.set(self.index, stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflow::profile::{PROFILE_SLOTS, ReflowProfile};
    use crate::storage::MemoryStorage;
    use crate::storage::store::NonVolatileStore;

    fn store() -> NonVolatileStore<MemoryStorage> {
        NonVolatileStore::new(MemoryStorage::new(1024), 0, 32)
    }

    #[test]
    fn test_edit_and_save() {
        let mut store = store();
        let mut library = ProfileLibrary::default();
        let mut editor = ProfileEditor::open(&library, 2).unwrap();
        editor.select(ProfileField::HoldTime);
        for _ in 0..15 {
            editor.increment();
        }
        editor.rename("SAC305");
        editor.save(&mut library, &mut store).unwrap();

        let slot = library.get(2).unwrap();
        assert_eq!(slot.name, "SAC305");
        assert_eq!(slot.profile.reflow_hold_time_s, 15);
        assert_eq!(store.load_profile(2).unwrap(), *slot);
    }

    #[test]
    fn test_invalid_draft_is_not_saved() {
        let mut store = store();
        let mut library = ProfileLibrary::default();
        store.save_profiles(&library).unwrap();
        let mut editor = ProfileEditor::open(&library, 0).unwrap();
        editor.select(ProfileField::SoakTemp);
        for _ in 0..50 {
            editor.increment();
        }
        assert!(matches!(
            editor.save(&mut library, &mut store),
            Err(EditError::Validation(ValidationError::NotMonotonic { .. }))
        ));
        assert_eq!(library.get(0).unwrap().profile, ReflowProfile::default());
        assert_eq!(store.load_profile(0).unwrap().profile, ReflowProfile::default());
    }

    #[test]
    fn test_cancel_restores_stored_slot() {
        let mut store = store();
        let mut library = ProfileLibrary::default();
        store.save_profiles(&library).unwrap();
        library.set(1, ProfileSlot::new("scratch", ReflowProfile::default()));
        let editor = ProfileEditor::open(&library, 1).unwrap();
        editor.cancel(&mut library, &store).unwrap();
        assert_eq!(library.get(1).unwrap().name, "Profile 2");
    }

    #[test]
    fn test_open_out_of_range() {
        let library = ProfileLibrary::default();
        assert!(matches!(
            ProfileEditor::open(&library, PROFILE_SLOTS),
            Err(EditError::NoSuchSlot(_))
        ));
    }

    #[test]
    fn test_select_next_wraps() {
        let library = ProfileLibrary::default();
        let mut editor = ProfileEditor::open(&library, 0).unwrap();
        for _ in 0..ProfileField::ALL.len() {
            editor.select_next();
        }
        assert_eq!(editor.selected(), ProfileField::PreheatTemp);
    }
}
