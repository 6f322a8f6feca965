// src/lib.rs - Reflow oven controller library
pub mod config;
pub mod hardware;
pub mod orchestrator;
pub mod reflow;
pub mod storage;
pub mod temperature;
pub mod validation;

pub use config::{Config, ConfigError, load_config};
pub use orchestrator::{ControlOrchestrator, Mode, OvenStatus, TickReport};
pub use reflow::{Phase, ProfileLibrary, ProfileSlot, ReflowProfile, ReflowSequencer};
pub use storage::{FileStorage, MemoryStorage, NonVolatileStore, Storage, StorageError};
pub use temperature::{ControllerConstants, TemperatureController};
pub use validation::ValidationError;
