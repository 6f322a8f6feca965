// src/reflow/mod.rs - Reflow recipes, the phase sequencer and profile editing
pub mod editor;
pub mod profile;
pub mod sequencer;

pub use editor::{EditError, ProfileEditor};
pub use profile::{ProfileField, ProfileLibrary, ProfileSlot, ReflowProfile};
pub use sequencer::{Phase, ReflowSequencer, SequencerOutput};
