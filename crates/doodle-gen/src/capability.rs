//! Image and speech generation capabilities
//!
//! The orchestrator only sees these two traits. How an implementation
//! produces pixels or samples, and when it loads its models, is its own
//! business. Each call carries the run's cancellation token; long calls
//! check it between steps and give up early once it is set.

use crate::progress::CancellationToken;
use doodle_core::{GenerationConfig, GenerationError};
use std::path::{Path, PathBuf};

/// What to draw for one scene
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub description: &'a str,
    /// Optional image guiding composition
    pub reference: Option<&'a Path>,
}

/// Produces a still image for a visual description.
///
/// Implementations write a new file inside `output_dir` and return its
/// path. The file is handed to the cache afterwards, so it must not be
/// reused by the implementation.
pub trait ImageCapability: Send + Sync {
    /// Provider name (e.g. "flux", "placeholder")
    fn name(&self) -> &str;

    fn generate_image(
        &self,
        request: &ImageRequest<'_>,
        config: &GenerationConfig,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, GenerationError>;
}

/// Produces narration audio for a piece of text
pub trait SpeechCapability: Send + Sync {
    /// Provider name (e.g. "elevenlabs", "placeholder")
    fn name(&self) -> &str;

    /// Unknown voices fail with `UnsupportedLanguage`
    fn synthesize_speech(
        &self,
        text: &str,
        voice: &str,
        config: &GenerationConfig,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, GenerationError>;
}

/// A fresh file name in `dir` for one produced artifact
pub(crate) fn scratch_path(dir: &Path, provider: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", provider, uuid::Uuid::new_v4().simple(), ext))
}

/// Failure returned by a capability that stopped because the run was cancelled
pub(crate) fn cancelled(provider: &str) -> GenerationError {
    GenerationError::model_load(format!("{} stopped: run cancelled", provider))
}

/// Make sure an output directory exists, reporting failure as a capability error
pub(crate) fn ensure_output_dir(dir: &Path) -> Result<(), GenerationError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        GenerationError::model_load(format!("Cannot create output directory {}: {}", dir.display(), e))
    })
}
