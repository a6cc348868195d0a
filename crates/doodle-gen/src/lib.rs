//! Doodle Gen - Scene artifact generation pipeline
//!
//! Resolves a hardware-appropriate generation config, then drives every
//! scene of a script through image and speech generation, reusing cached
//! artifacts where possible and recording failures per scene instead of
//! aborting the run.

pub mod capability;
pub mod config;
pub mod hardware;
pub mod manifest;
pub mod orchestrator;
pub mod outcome;
pub mod pool;
pub mod preset;
pub mod progress;
pub mod providers;
pub mod voice;

pub use capability::{ImageCapability, ImageRequest, SpeechCapability};
pub use config::DoodleConfig;
pub use hardware::{HardwareProfile, HardwareResolver};
pub use manifest::RunManifest;
pub use orchestrator::{Orchestrator, RunOptions};
pub use outcome::{ArtifactOutcome, RunStatus, SceneOutcome, SceneStatus, ScriptResult};
pub use pool::SchedulePlan;
pub use preset::resolve_preset;
pub use progress::{CancellationToken, LogObserver, RunObserver, SceneState};
pub use providers::Ranked;
pub use voice::Voice;
