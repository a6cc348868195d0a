//! Run manifest handed to the video assembler
//!
//! Records, per scene, which artifacts a run produced, where they live and
//! why any are missing.

use crate::outcome::{ArtifactOutcome, SceneStatus, ScriptResult};
use chrono::{DateTime, Utc};
use doodle_cache::ArtifactSource;
use doodle_core::{DoodleError, GenerationConfig, HardwareTier, QualityLevel, Result, SceneId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One artifact of one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestArtifact {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub source: Option<ArtifactSource>,
    /// Failure reason when no artifact is available
    #[serde(default)]
    pub failure: Option<String>,
}

impl From<&ArtifactOutcome> for ManifestArtifact {
    fn from(outcome: &ArtifactOutcome) -> Self {
        Self {
            path: outcome.path().map(Path::to_path_buf),
            source: outcome.source(),
            failure: outcome.failure().map(|f| f.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestScene {
    pub id: SceneId,
    pub status: SceneStatus,
    pub image: ManifestArtifact,
    pub audio: ManifestArtifact,
}

/// Outcome of one run, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub title: String,
    pub quality: QualityLevel,
    pub tier: HardwareTier,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub cancelled: bool,
    pub config: GenerationConfig,
    pub scenes: Vec<ManifestScene>,
}

/// TOML wrapper
#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    manifest: RunManifest,
}

impl RunManifest {
    pub fn from_result(result: &ScriptResult) -> Self {
        Self {
            title: result.title.clone(),
            quality: result.config.quality,
            tier: result.tier,
            generated_at: Utc::now(),
            cancelled: result.cancelled,
            config: result.config,
            scenes: result
                .scenes
                .iter()
                .map(|scene| ManifestScene {
                    id: scene.scene_id,
                    status: scene.status(),
                    image: (&scene.image).into(),
                    audio: (&scene.audio).into(),
                })
                .collect(),
        }
    }

    /// `.doodle/runs/<title-slug>.toml`
    pub fn default_path(title: &str) -> PathBuf {
        PathBuf::from(".doodle")
            .join("runs")
            .join(format!("{}.toml", slugify(title)))
    }

    /// Scenes missing at least one artifact
    pub fn incomplete_scenes(&self) -> impl Iterator<Item = &ManifestScene> + '_ {
        self.scenes.iter().filter(|s| s.status != SceneStatus::Success)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: ManifestFile = toml::from_str(&content).map_err(|e| {
            DoodleError::TomlParse(format!("Failed to parse manifest {}: {}", path.display(), e))
        })?;
        Ok(file.manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = ManifestFile {
            manifest: self.clone(),
        };
        let content = toml::to_string_pretty(&file)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Lowercase ASCII words joined by `-`
fn slugify(title: &str) -> String {
    let slug = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}
