//! Cache key derivation

use doodle_core::{ContentHash, GenerationConfig, SceneId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Version tag mixed into every key; bump to orphan old entries
const KEY_SCHEMA: &str = "doodle-cache/v1";

/// The kind of artifact a cache entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Audio,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Image, ArtifactKind::Audio];

    /// Subdirectory of the cache root holding this kind
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "images",
            ArtifactKind::Audio => "audio",
        }
    }

    /// Extension used when a produced file has none
    pub fn default_extension(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "png",
            ArtifactKind::Audio => "wav",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Image => write!(f, "image"),
            ArtifactKind::Audio => write!(f, "audio"),
        }
    }
}

/// The semantic part of a generation request: what is being drawn or said.
///
/// Fields are named and ordered, so two inputs are equal exactly when they
/// were built from the same values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticInput {
    fields: Vec<(&'static str, Option<String>)>,
}

impl SemanticInput {
    /// Visual description plus the identity of an optional reference image
    pub fn image(prompt: &str, reference: Option<String>) -> Self {
        Self {
            fields: vec![("prompt", Some(prompt.to_string())), ("reference", reference)],
        }
    }

    /// Narration text spoken by a voice
    pub fn speech(text: &str, voice: &str) -> Self {
        Self {
            fields: vec![("text", Some(text.to_string())), ("voice", Some(voice.to_string()))],
        }
    }
}

/// A fixed-length content key for one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub kind: ArtifactKind,
    pub hash: ContentHash,
}

impl CacheKey {
    /// File name stem for an artifact produced for `scene`
    pub fn file_stem(&self, scene: SceneId) -> String {
        format!("{}_{}", scene, self.hash.to_hex())
    }

    /// Parse `<scene-id>_<hex>.<ext>` back into a key and scene id
    pub fn parse_file_name(kind: ArtifactKind, file_name: &str) -> Option<(Self, SceneId)> {
        let (stem, _ext) = file_name.rsplit_once('.')?;
        let (scene, hex) = stem.split_once('_')?;
        let scene = scene.parse::<u32>().ok()?;
        let hash = ContentHash::from_hex(hex)?;
        Some((CacheKey { kind, hash }, SceneId(scene)))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.hash)
    }
}

/// Derive the key for an artifact.
///
/// Pure: the result depends only on the arguments, never on time, process
/// or host.
pub fn compute_key(kind: ArtifactKind, input: &SemanticInput, config: &GenerationConfig) -> CacheKey {
    let mut hasher = ContentHash::builder().field(KEY_SCHEMA).field(kind.to_string());
    for (name, value) in &input.fields {
        hasher = hasher.field(name).optional_field(value.as_deref());
    }
    let hash = hasher.field(config.fingerprint()).finish();
    CacheKey { kind, hash }
}

/// Identity of a reference image for keying.
///
/// Readable files are identified by content, so moving a file keeps its
/// key and editing it changes the key. Unreadable paths fall back to the
/// path text.
pub fn reference_identity(path: &Path) -> String {
    match ContentHash::from_file(path) {
        Ok(hash) => format!("sha256:{}", hash.to_hex()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "reference image unreadable; keying on path");
            format!("path:{}", path.display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doodle_core::{QualityLevel, Scheduler};

    fn config() -> GenerationConfig {
        GenerationConfig {
            quality: QualityLevel::Fast,
            steps: 4,
            resolution: 512,
            quantize: true,
            guidance_scale: 1.0,
            scheduler: Scheduler::Lcm,
            sample_rate: 22050,
        }
    }

    #[test]
    fn test_key_is_deterministic() {
        let input = SemanticInput::speech("Water is our most precious resource", "female_us");
        let a = compute_key(ArtifactKind::Audio, &input, &config());
        let b = compute_key(ArtifactKind::Audio, &input, &config());
        assert_eq!(a, b);
        assert_eq!(a.hash.to_hex().len(), 64);
    }

    #[test]
    fn test_each_field_changes_key() {
        let base_input = SemanticInput::image("Earth with water droplets", None);
        let base = compute_key(ArtifactKind::Image, &base_input, &config());

        let other_kind = compute_key(ArtifactKind::Audio, &base_input, &config());
        let other_prompt = compute_key(
            ArtifactKind::Image,
            &SemanticInput::image("Earth with clouds", None),
            &config(),
        );
        let with_reference = compute_key(
            ArtifactKind::Image,
            &SemanticInput::image("Earth with water droplets", Some("sha256:00".into())),
            &config(),
        );
        let other_config = compute_key(
            ArtifactKind::Image,
            &base_input,
            &GenerationConfig {
                resolution: 768,
                ..config()
            },
        );

        for key in [other_kind, other_prompt, with_reference, other_config] {
            assert_ne!(key, base);
        }
    }

    #[test]
    fn test_voice_changes_speech_key() {
        let a = compute_key(ArtifactKind::Audio, &SemanticInput::speech("hola", "female_es"), &config());
        let b = compute_key(ArtifactKind::Audio, &SemanticInput::speech("hola", "male_es"), &config());
        assert_ne!(a, b);
    }

    #[test]
    fn test_file_name_roundtrip() {
        let key = compute_key(ArtifactKind::Image, &SemanticInput::image("sink", None), &config());
        let name = format!("{}.png", key.file_stem(SceneId(7)));
        let (parsed, scene) = CacheKey::parse_file_name(ArtifactKind::Image, &name).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(scene, SceneId(7));
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert!(CacheKey::parse_file_name(ArtifactKind::Image, "notes.txt").is_none());
        assert!(CacheKey::parse_file_name(ArtifactKind::Image, ".abc.partial").is_none());
        assert!(CacheKey::parse_file_name(ArtifactKind::Audio, "3_deadbeef.wav").is_none());
    }

    #[test]
    fn test_reference_identity_follows_content() {
        let dir = std::env::temp_dir().join(format!("doodle_key_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("a.png");
        let b = dir.join("b.png");
        std::fs::write(&a, b"same pixels").unwrap();
        std::fs::write(&b, b"same pixels").unwrap();

        assert_eq!(reference_identity(&a), reference_identity(&b));
        assert!(reference_identity(&dir.join("missing.png")).starts_with("path:"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
