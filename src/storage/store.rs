// src/storage/store.rs - Constants and profile records on top of byte storage
use super::{Storage, StorageError};
use crate::reflow::profile::{PROFILE_SLOTS, ProfileLibrary, ProfileSlot, ReflowProfile};
use crate::temperature::constants::ControllerConstants;

/// Bytes occupied by the full profile library.
pub const PROFILES_REGION_LEN: usize = PROFILE_SLOTS * ProfileSlot::ENCODED_LEN;

pub trait ConstantsStore {
    fn load_constants(&self, address: usize) -> Result<ControllerConstants, StorageError>;
    fn save_constants(
        &mut self,
        address: usize,
        constants: &ControllerConstants,
    ) -> Result<(), StorageError>;
}

pub trait ProfileStore {
    fn load_profile(&self, index: usize) -> Result<ProfileSlot, StorageError>;
    fn save_profile(&mut self, index: usize, slot: &ProfileSlot) -> Result<(), StorageError>;
    /// Persist every slot in a single write.
    fn save_profiles(&mut self, library: &ProfileLibrary) -> Result<(), StorageError>;
}

/// Constants and profiles laid out in one storage image.
#[derive(Debug)]
pub struct NonVolatileStore<S: Storage> {
    storage: S,
    constants_address: usize,
    profiles_address: usize,
}

impl<S: Storage> NonVolatileStore<S> {
    pub fn new(storage: S, constants_address: usize, profiles_address: usize) -> Self {
        Self {
            storage,
            constants_address,
            profiles_address,
        }
    }

    pub fn constants_address(&self) -> usize {
        self.constants_address
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn slot_address(&self, index: usize) -> Result<usize, StorageError> {
        if index >= PROFILE_SLOTS {
            return Err(StorageError::NotFound(format!(
                "profile slot {} (only {} slots)",
                index, PROFILE_SLOTS
            )));
        }
        Ok(self.profiles_address + index * ProfileSlot::ENCODED_LEN)
    }
}

impl<S: Storage> ConstantsStore for NonVolatileStore<S> {
    fn load_constants(&self, address: usize) -> Result<ControllerConstants, StorageError> {
        let mut buf = [0u8; ControllerConstants::ENCODED_LEN];
        self.storage.read(address, &mut buf)?;
        ControllerConstants::decode(&buf)
    }

    fn save_constants(
        &mut self,
        address: usize,
        constants: &ControllerConstants,
    ) -> Result<(), StorageError> {
        self.storage.write(address, &constants.encode())
    }
}

impl<S: Storage> ProfileStore for NonVolatileStore<S> {
    fn load_profile(&self, index: usize) -> Result<ProfileSlot, StorageError> {
        let address = self.slot_address(index)?;
        let mut buf = [0u8; ProfileSlot::ENCODED_LEN];
        self.storage.read(address, &mut buf)?;
        ProfileSlot::decode(&buf)
    }

    fn save_profile(&mut self, index: usize, slot: &ProfileSlot) -> Result<(), StorageError> {
        let address = self.slot_address(index)?;
        self.storage.write(address, &slot.encode())
    }

    fn save_profiles(&mut self, library: &ProfileLibrary) -> Result<(), StorageError> {
        let mut image = Vec::with_capacity(PROFILES_REGION_LEN);
        for slot in library.slots() {
            image.extend_from_slice(&slot.encode());
        }
        self.storage.write(self.profiles_address, &image)
    }
}

/// Load the constants at `address`, substituting and re-persisting
/// `defaults` when the stored copy is unreadable or invalid.
pub fn load_constants_or_default<S: ConstantsStore + ?Sized>(
    store: &mut S,
    address: usize,
    defaults: ControllerConstants,
) -> ControllerConstants {
    let reason = match store.load_constants(address) {
        Ok(constants) => match constants.validate() {
            Ok(()) => return constants,
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };
    tracing::warn!("Stored controller constants rejected ({}); restoring defaults", reason);
    if let Err(e) = store.save_constants(address, &defaults) {
        tracing::error!("Failed to persist default constants: {}", e);
    }
    defaults
}

/// Load every profile slot, replacing unreadable or invalid slots with
/// `default_profile`. If any slot was replaced the whole library is
/// persisted again.
pub fn load_profiles_or_default<S: ProfileStore + ?Sized>(
    store: &mut S,
    default_profile: ReflowProfile,
) -> ProfileLibrary {
    let mut replaced = 0usize;
    let slots: Vec<ProfileSlot> = (0..PROFILE_SLOTS)
        .map(|index| {
            let reason = match store.load_profile(index) {
                Ok(slot) => match slot.validate() {
                    Ok(()) => return slot,
                    Err(e) => e.to_string(),
                },
                Err(e) => e.to_string(),
            };
            tracing::warn!("Profile slot {} rejected ({}); using default profile", index, reason);
            replaced += 1;
            ProfileSlot::default_for(index, default_profile)
        })
        .collect();
    let library = ProfileLibrary::from_slots(slots)
        .unwrap_or_else(|| ProfileLibrary::filled_with(default_profile));
    if replaced > 0 {
        if let Err(e) = store.save_profiles(&library) {
            tracing::error!("Failed to persist repaired profiles: {}", e);
        } else {
            tracing::info!("Repaired {} profile slot(s)", replaced);
        }
    }
    library
}
