//! Per-scene and per-script generation results

use doodle_cache::{ArtifactSource, Resolution};
use doodle_core::{ArtifactFailure, GenerationConfig, HardwareTier, SceneId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of resolving one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactOutcome {
    Ready(Resolution),
    Failed { failure: ArtifactFailure },
}

impl ArtifactOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ArtifactOutcome::Ready(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ArtifactOutcome::Ready(resolution) => Some(&resolution.path),
            ArtifactOutcome::Failed { .. } => None,
        }
    }

    pub fn source(&self) -> Option<ArtifactSource> {
        match self {
            ArtifactOutcome::Ready(resolution) => Some(resolution.source),
            ArtifactOutcome::Failed { .. } => None,
        }
    }

    /// True when the artifact was reused rather than produced for this scene
    pub fn cache_hit(&self) -> bool {
        match self {
            ArtifactOutcome::Ready(resolution) => resolution.cache_hit(),
            ArtifactOutcome::Failed { .. } => false,
        }
    }

    pub fn failure(&self) -> Option<&ArtifactFailure> {
        match self {
            ArtifactOutcome::Ready(_) => None,
            ArtifactOutcome::Failed { failure } => Some(failure),
        }
    }
}

impl From<Result<Resolution, ArtifactFailure>> for ArtifactOutcome {
    fn from(result: Result<Resolution, ArtifactFailure>) -> Self {
        match result {
            Ok(resolution) => ArtifactOutcome::Ready(resolution),
            Err(failure) => ArtifactOutcome::Failed { failure },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    /// Image and audio both available
    Success,
    /// Exactly one artifact available
    Partial,
    /// Neither artifact available
    Failed,
}

impl SceneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneStatus::Success => "success",
            SceneStatus::Partial => "partial",
            SceneStatus::Failed => "failed",
        }
    }
}

/// Outcome of one scene in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneOutcome {
    pub scene_id: SceneId,
    pub image: ArtifactOutcome,
    pub audio: ArtifactOutcome,
}

impl SceneOutcome {
    pub fn status(&self) -> SceneStatus {
        match (self.image.is_ready(), self.audio.is_ready()) {
            (true, true) => SceneStatus::Success,
            (false, false) => SceneStatus::Failed,
            _ => SceneStatus::Partial,
        }
    }
}

/// Overall result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Scenes that are not fully successful, in script order
    PartialFailure { affected: Vec<SceneId> },
}

/// Ordered scene outcomes for a whole script
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptResult {
    pub title: String,
    pub tier: HardwareTier,
    pub config: GenerationConfig,
    pub scenes: Vec<SceneOutcome>,
    pub status: RunStatus,
    /// The run was cancelled before every artifact was attempted
    pub cancelled: bool,
}

impl ScriptResult {
    /// Assemble a result, deriving the overall status from the scenes
    pub fn new(
        title: impl Into<String>,
        tier: HardwareTier,
        config: GenerationConfig,
        scenes: Vec<SceneOutcome>,
        cancelled: bool,
    ) -> Self {
        let affected: Vec<SceneId> = scenes
            .iter()
            .filter(|s| s.status() != SceneStatus::Success)
            .map(|s| s.scene_id)
            .collect();
        let status = if affected.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::PartialFailure { affected }
        };

        Self {
            title: title.into(),
            tier,
            config,
            scenes,
            status,
            cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// No scene produced any artifact
    pub fn is_total_failure(&self) -> bool {
        !self.scenes.is_empty() && self.scenes.iter().all(|s| s.status() == SceneStatus::Failed)
    }

    pub fn affected_scenes(&self) -> &[SceneId] {
        match &self.status {
            RunStatus::Success => &[],
            RunStatus::PartialFailure { affected } => affected,
        }
    }

    pub fn scene(&self, id: SceneId) -> Option<&SceneOutcome> {
        self.scenes.iter().find(|s| s.scene_id == id)
    }

    /// Artifacts produced by this run (not reused)
    pub fn generated_count(&self) -> usize {
        self.artifacts()
            .filter(|a| a.source() == Some(ArtifactSource::Generated))
            .count()
    }

    /// Artifacts reused from the cache or a concurrent scene
    pub fn cache_hit_count(&self) -> usize {
        self.artifacts().filter(|a| a.cache_hit()).count()
    }

    fn artifacts(&self) -> impl Iterator<Item = &ArtifactOutcome> + '_ {
        self.scenes.iter().flat_map(|s| [&s.image, &s.audio])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::resolve_preset;
    use doodle_core::{GenerationError, QualityLevel};
    use std::path::PathBuf;

    fn ready(source: ArtifactSource) -> ArtifactOutcome {
        ArtifactOutcome::Ready(Resolution {
            path: PathBuf::from("/cache/x"),
            source,
        })
    }

    fn failed() -> ArtifactOutcome {
        ArtifactOutcome::Failed {
            failure: GenerationError::out_of_memory("oom").into(),
        }
    }

    fn scene(id: u32, image: ArtifactOutcome, audio: ArtifactOutcome) -> SceneOutcome {
        SceneOutcome {
            scene_id: SceneId(id),
            image,
            audio,
        }
    }

    fn result(scenes: Vec<SceneOutcome>) -> ScriptResult {
        ScriptResult::new(
            "t",
            HardwareTier::CpuOnly,
            resolve_preset(QualityLevel::Fast, HardwareTier::CpuOnly),
            scenes,
            false,
        )
    }

    #[test]
    fn test_scene_status() {
        use ArtifactSource::*;
        assert_eq!(scene(1, ready(Generated), ready(Cached)).status(), SceneStatus::Success);
        assert_eq!(scene(1, failed(), ready(Cached)).status(), SceneStatus::Partial);
        assert_eq!(scene(1, ready(Shared), failed()).status(), SceneStatus::Partial);
        assert_eq!(scene(1, failed(), failed()).status(), SceneStatus::Failed);
    }

    #[test]
    fn test_run_status_lists_affected_scenes() {
        use ArtifactSource::*;
        let run = result(vec![
            scene(1, ready(Generated), ready(Generated)),
            scene(2, failed(), ready(Generated)),
            scene(3, ready(Cached), ready(Shared)),
        ]);
        assert_eq!(run.status, RunStatus::PartialFailure { affected: vec![SceneId(2)] });
        assert!(!run.is_total_failure());
        assert_eq!(run.generated_count(), 3);
        assert_eq!(run.cache_hit_count(), 2);
    }

    #[test]
    fn test_total_failure() {
        let run = result(vec![scene(1, failed(), failed()), scene(2, failed(), failed())]);
        assert!(run.is_total_failure());
        assert_eq!(run.affected_scenes(), &[SceneId(1), SceneId(2)]);
    }

    #[test]
    fn test_success() {
        let run = result(vec![scene(1, ready(ArtifactSource::Cached), ready(ArtifactSource::Cached))]);
        assert!(run.is_success());
        assert!(run.affected_scenes().is_empty());
    }
}
