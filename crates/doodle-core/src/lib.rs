//! Doodle Core - Foundational types for the Doodle video pipeline
//!
//! This crate provides the types that all other Doodle crates depend on:
//! - `Script`, `Scene` - Validated script model
//! - `ContentHash` - SHA-256 based content hashing
//! - `QualityLevel`, `HardwareTier`, `GenerationConfig` - Generation settings
//! - Error types and Result alias

mod error;
mod hash;
pub mod script;
mod types;

pub use error::{ArtifactFailure, DoodleError, GenerationError, GenerationErrorKind, Result};
pub use hash::ContentHash;
pub use script::{DurationMode, Scene, SceneId, Script};
pub use types::{GenerationConfig, HardwareTier, QualityLevel, Scheduler};
