//! Script model and ingestion
//!
//! A `Script` is an ordered list of `Scene`s plus the narration language and
//! default voice. Both types validate on construction and are read-only
//! afterwards. Scripts can be loaded from JSON or from Markdown with YAML
//! front matter:
//!
//! ```text
//! ---
//! title: Water Conservation Tips
//! language: en
//! voice: female_us
//! ---
//! ## Scene 1
//! **Narration:** Water is our most precious resource
//! **Visual:** Earth with water droplets
//! **Duration:** auto
//! ```

use crate::error::{DoodleError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Languages the speech pipeline has voices for
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "es", "es_latam"];

/// Voice used when a script does not name one
pub const DEFAULT_VOICE: &str = "female_us";

/// Scene identifier, unique within a script
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub u32);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How long a scene should last in the assembled video
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationMode {
    /// Follow the narration length
    #[default]
    Auto,
    Seconds(f64),
}

impl DurationMode {
    /// Parse `"auto"` or a non-negative number of seconds
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("auto") {
            return Some(DurationMode::Auto);
        }
        value.parse::<f64>().ok().and_then(Self::seconds)
    }

    /// Explicit duration; rejects negative and non-finite values
    pub fn seconds(secs: f64) -> Option<Self> {
        (secs.is_finite() && secs >= 0.0).then_some(DurationMode::Seconds(secs))
    }
}

/// One narration + visual unit of a script
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    id: SceneId,
    narration: String,
    visual_description: String,
    reference_image: Option<PathBuf>,
    duration: DurationMode,
}

impl Scene {
    pub fn new(
        id: SceneId,
        narration: impl Into<String>,
        visual_description: impl Into<String>,
        reference_image: Option<PathBuf>,
        duration: DurationMode,
    ) -> Result<Self> {
        let narration = narration.into();
        let visual_description = visual_description.into();

        if id.0 == 0 {
            return Err(DoodleError::Validation(
                "Scene ids must start at 1".to_string(),
            ));
        }
        if narration.trim().is_empty() {
            return Err(DoodleError::Validation(format!(
                "Scene {}: narration cannot be empty",
                id
            )));
        }
        if visual_description.trim().is_empty() {
            return Err(DoodleError::Validation(format!(
                "Scene {}: visual_description cannot be empty",
                id
            )));
        }
        if let DurationMode::Seconds(secs) = duration {
            if !secs.is_finite() || secs < 0.0 {
                return Err(DoodleError::Validation(format!(
                    "Scene {}: duration must be 'auto' or a non-negative number, got {}",
                    id, secs
                )));
            }
        }

        Ok(Self {
            id,
            narration,
            visual_description,
            reference_image,
            duration,
        })
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn narration(&self) -> &str {
        &self.narration
    }

    pub fn visual_description(&self) -> &str {
        &self.visual_description
    }

    pub fn reference_image(&self) -> Option<&Path> {
        self.reference_image.as_deref()
    }

    pub fn duration(&self) -> DurationMode {
        self.duration
    }
}

/// A complete, validated video script
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Script {
    title: String,
    language: String,
    voice: String,
    scenes: Vec<Scene>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl Script {
    /// Build a script, enforcing a non-empty title, at least one scene and
    /// unique scene ids. Scenes are ordered by id.
    pub fn new(
        title: impl Into<String>,
        language: impl Into<String>,
        voice: impl Into<String>,
        mut scenes: Vec<Scene>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<Self> {
        let title = title.into();
        let language = language.into();
        let voice = voice.into();

        if title.trim().is_empty() {
            return Err(DoodleError::Validation(
                "Script title cannot be empty".to_string(),
            ));
        }
        if scenes.is_empty() {
            return Err(DoodleError::Validation(
                "Script must contain at least one scene".to_string(),
            ));
        }
        if voice.trim().is_empty() {
            return Err(DoodleError::Validation(
                "Script voice cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for scene in &scenes {
            if !seen.insert(scene.id) {
                return Err(DoodleError::Validation(format!(
                    "Scene ids must be unique (duplicate id {})",
                    scene.id
                )));
            }
        }

        if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
            tracing::warn!(
                language = %language,
                "language not in supported list {:?}; speech synthesis may fail",
                SUPPORTED_LANGUAGES
            );
        }

        scenes.sort_by_key(|s| s.id);

        Ok(Self {
            title,
            language,
            voice,
            scenes,
            metadata,
        })
    }

    /// Load a script from a `.json`, `.md` or `.markdown` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let content = std::fs::read_to_string(path).map_err(|e| {
            DoodleError::Validation(format!("Cannot read script {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

        tracing::info!(path = %path.display(), "parsing script");

        match extension.as_str() {
            "json" => Self::from_json_str(&content, base_dir),
            "md" | "markdown" => Self::from_markdown_str(&content, base_dir),
            other => Err(DoodleError::Validation(format!(
                "Unsupported script extension '.{}'. Supported formats: .json, .md, .markdown",
                other
            ))),
        }
    }

    /// Parse a JSON script; relative reference images resolve against `base_dir`
    pub fn from_json_str(content: &str, base_dir: &Path) -> Result<Self> {
        let raw: RawScript = serde_json::from_str(content)
            .map_err(|e| DoodleError::ScriptParse(format!("Invalid JSON script: {}", e)))?;
        raw.into_script(base_dir)
    }

    /// Parse a Markdown script with YAML front matter
    pub fn from_markdown_str(content: &str, base_dir: &Path) -> Result<Self> {
        let (front, body) = split_front_matter(content).ok_or_else(|| {
            DoodleError::ScriptParse(
                "Missing YAML front matter. Markdown scripts must start with --- delimited metadata"
                    .to_string(),
            )
        })?;

        let mut front: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(front)
            .map_err(|e| DoodleError::ScriptParse(format!("Invalid YAML front matter: {}", e)))?;

        let mut take_string = |key: &str| -> Option<String> {
            front.remove(key).and_then(|v| match v {
                serde_yaml::Value::String(s) => Some(s),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };

        let title = take_string("title");
        let language = take_string("language");
        let voice = take_string("voice");

        let missing: Vec<&str> = [("title", &title), ("language", &language)]
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            return Err(DoodleError::ScriptParse(format!(
                "Missing required front matter fields: {}",
                missing.join(", ")
            )));
        }

        let scenes = parse_markdown_scenes(body)?;
        if scenes.is_empty() {
            return Err(DoodleError::Validation(
                "No scenes found in Markdown script".to_string(),
            ));
        }

        let metadata = front
            .into_iter()
            .map(|(k, v)| Ok((k, serde_json::to_value(v)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        RawScript {
            title: title.unwrap_or_default(),
            language: language.unwrap_or_default(),
            voice: voice.unwrap_or_else(default_voice),
            scenes,
            metadata,
        }
        .into_script(base_dir)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Default narration voice for every scene
    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Scenes whose reference image does not exist on disk
    pub fn missing_reference_images(&self) -> Vec<(SceneId, PathBuf)> {
        self.scenes
            .iter()
            .filter_map(|s| {
                s.reference_image
                    .as_ref()
                    .filter(|p| !p.exists())
                    .map(|p| (s.id, p.clone()))
            })
            .collect()
    }
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

#[derive(Debug, Deserialize)]
struct RawScript {
    title: String,
    language: String,
    #[serde(default = "default_voice")]
    voice: String,
    scenes: Vec<RawScene>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawScene {
    id: u32,
    narration: String,
    visual_description: String,
    #[serde(default)]
    duration: Option<RawDuration>,
    #[serde(default)]
    reference_image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(f64),
    Text(String),
}

impl RawScript {
    fn into_script(self, base_dir: &Path) -> Result<Script> {
        let scenes = self
            .scenes
            .into_iter()
            .map(|raw| raw.into_scene(base_dir))
            .collect::<Result<Vec<_>>>()?;
        Script::new(self.title, self.language, self.voice, scenes, self.metadata)
    }
}

impl RawScene {
    fn into_scene(self, base_dir: &Path) -> Result<Scene> {
        let id = SceneId(self.id);
        let duration = match self.duration {
            None => DurationMode::Auto,
            Some(RawDuration::Seconds(secs)) => DurationMode::seconds(secs).ok_or_else(|| {
                DoodleError::Validation(format!(
                    "Scene {}: duration must be 'auto' or a non-negative number, got {}",
                    id, secs
                ))
            })?,
            Some(RawDuration::Text(text)) => DurationMode::parse(&text).ok_or_else(|| {
                DoodleError::Validation(format!(
                    "Scene {}: duration must be 'auto' or a non-negative number, got '{}'",
                    id, text
                ))
            })?,
        };

        let reference_image = self
            .reference_image
            .filter(|r| !r.trim().is_empty())
            .map(|r| {
                let path = PathBuf::from(r.trim());
                if path.is_relative() {
                    base_dir.join(path)
                } else {
                    path
                }
            });

        Scene::new(id, self.narration, self.visual_description, reference_image, duration)
    }
}

/// Split `---\n<yaml>\n---\n<body>`; returns `None` without front matter
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let content = content.trim_start_matches('\u{feff}');
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Parse `## Scene` sections of `**Field:** value` lines.
///
/// Scenes are numbered in header order. A section without both narration
/// and visual is skipped.
fn parse_markdown_scenes(body: &str) -> Result<Vec<RawScene>> {
    let mut scenes = Vec::new();
    let mut current: Option<MarkdownScene> = None;
    let mut next_id = 0u32;

    for line in body.lines() {
        let line = line.trim();

        if line.starts_with("## Scene") {
            if let Some(scene) = current.take().and_then(MarkdownScene::finish) {
                scenes.push(scene);
            }
            next_id += 1;
            current = Some(MarkdownScene::new(next_id));
            continue;
        }

        let Some(scene) = current.as_mut() else {
            continue;
        };
        if !line.starts_with("**") {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.replace("**", "").trim().to_lowercase();
        let value = value.replace("**", "").trim().to_string();

        match name.as_str() {
            "narration" | "narration text" | "text" => scene.narration = Some(value),
            "visual" | "visual_description" | "visual description" | "description" => {
                scene.visual = Some(value)
            }
            "duration" => scene.duration = Some(value),
            "reference" | "reference_image" | "reference image" | "image" => {
                scene.reference = Some(value)
            }
            _ => {}
        }
    }

    if let Some(scene) = current.and_then(MarkdownScene::finish) {
        scenes.push(scene);
    }

    Ok(scenes)
}

struct MarkdownScene {
    id: u32,
    narration: Option<String>,
    visual: Option<String>,
    duration: Option<String>,
    reference: Option<String>,
}

impl MarkdownScene {
    fn new(id: u32) -> Self {
        Self {
            id,
            narration: None,
            visual: None,
            duration: None,
            reference: None,
        }
    }

    fn finish(self) -> Option<RawScene> {
        Some(RawScene {
            id: self.id,
            narration: self.narration?,
            visual_description: self.visual?,
            duration: self.duration.map(RawDuration::Text),
            reference_image: self.reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATER_JSON: &str = r#"{
        "title": "Water Conservation Tips",
        "language": "en",
        "scenes": [
            {"id": 2, "narration": "Turning off the tap saves water", "visual_description": "bathroom sink with faucet", "duration": 4.5},
            {"id": 1, "narration": "Water is our most precious resource", "visual_description": "Earth with water droplets"}
        ]
    }"#;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("doodle_script_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_json_script() {
        let script = Script::from_json_str(WATER_JSON, Path::new("")).unwrap();
        assert_eq!(script.title(), "Water Conservation Tips");
        assert_eq!(script.language(), "en");
        assert_eq!(script.voice(), DEFAULT_VOICE);
        assert_eq!(script.len(), 2);

        // Sorted by id
        assert_eq!(script.scenes()[0].id(), SceneId(1));
        assert_eq!(script.scenes()[0].duration(), DurationMode::Auto);
        assert_eq!(script.scenes()[1].duration(), DurationMode::Seconds(4.5));
    }

    #[test]
    fn test_empty_scenes_rejected() {
        let json = r#"{"title": "t", "language": "en", "scenes": []}"#;
        let err = Script::from_json_str(json, Path::new("")).unwrap_err();
        assert!(matches!(err, DoodleError::Validation(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"title": "t", "language": "en", "scenes": [
            {"id": 1, "narration": "a", "visual_description": "b"},
            {"id": 1, "narration": "c", "visual_description": "d"}
        ]}"#;
        let err = Script::from_json_str(json, Path::new("")).unwrap_err();
        assert!(err.to_string().contains("unique"));
    }

    #[test]
    fn test_blank_narration_rejected() {
        let result = Scene::new(SceneId(1), "   ", "a sink", None, DurationMode::Auto);
        assert!(matches!(result, Err(DoodleError::Validation(_))));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let json = r#"{"title": "t", "language": "en", "scenes": [
            {"id": 1, "narration": "a", "visual_description": "b", "duration": -2}
        ]}"#;
        assert!(Script::from_json_str(json, Path::new("")).is_err());

        let json = r#"{"title": "t", "language": "en", "scenes": [
            {"id": 1, "narration": "a", "visual_description": "b", "duration": "soon"}
        ]}"#;
        assert!(Script::from_json_str(json, Path::new("")).is_err());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = Script::from_json_str("{ not json", Path::new("")).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_relative_reference_resolves_against_script_dir() {
        let json = r#"{"title": "t", "language": "en", "scenes": [
            {"id": 1, "narration": "a", "visual_description": "b", "reference_image": "refs/globe.png"}
        ]}"#;
        let script = Script::from_json_str(json, Path::new("/projects/water")).unwrap();
        assert_eq!(
            script.scenes()[0].reference_image(),
            Some(Path::new("/projects/water/refs/globe.png"))
        );
        assert_eq!(script.missing_reference_images().len(), 1);
    }

    #[test]
    fn test_parse_markdown_script() {
        let md = "---\ntitle: Water Conservation Tips\nlanguage: en\nvoice: male_us\nauthor: Ana\n---\n\n## Scene 1\n**Narration:** Water is our most precious resource\n**Visual:** Earth with water droplets\n\n## Scene 2\n**Narration:** Turning off the tap saves water\n**Visual description:** bathroom sink with faucet\n**Duration:** 3\n";
        let script = Script::from_markdown_str(md, Path::new("")).unwrap();
        assert_eq!(script.voice(), "male_us");
        assert_eq!(script.len(), 2);
        assert_eq!(script.scenes()[1].visual_description(), "bathroom sink with faucet");
        assert_eq!(script.scenes()[1].duration(), DurationMode::Seconds(3.0));
        assert_eq!(script.metadata().get("author"), Some(&serde_json::json!("Ana")));
    }

    #[test]
    fn test_markdown_skips_incomplete_scene() {
        let md = "---\ntitle: t\nlanguage: es\n---\n## Scene 1\n**Narration:** solo texto\n## Scene 2\n**Narration:** hola\n**Visual:** un sol\n";
        let script = Script::from_markdown_str(md, Path::new("")).unwrap();
        assert_eq!(script.len(), 1);
        assert_eq!(script.scenes()[0].id(), SceneId(2));
    }

    #[test]
    fn test_markdown_requires_front_matter() {
        let err = Script::from_markdown_str("## Scene 1\n", Path::new("")).unwrap_err();
        assert!(err.is_validation());

        let err = Script::from_markdown_str("---\ntitle: t\n---\n## Scene 1\n", Path::new("")).unwrap_err();
        assert!(err.to_string().contains("language"));
    }

    #[test]
    fn test_load_dispatches_on_extension() {
        let dir = temp_dir();
        let json_path = dir.join("water.json");
        std::fs::write(&json_path, WATER_JSON).unwrap();
        assert_eq!(Script::load(&json_path).unwrap().len(), 2);

        let txt_path = dir.join("water.txt");
        std::fs::write(&txt_path, WATER_JSON).unwrap();
        assert!(matches!(Script::load(&txt_path), Err(DoodleError::Validation(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
