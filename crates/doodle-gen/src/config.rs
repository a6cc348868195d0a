//! Layered configuration system
//!
//! Config is loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `DOODLE_{PROVIDER}_API_KEY`, `DOODLE_HARDWARE_TIER`,
//!    `DOODLE_CACHE_DIR`
//! 2. Project-local: `.doodle/config.toml`
//! 3. Global: `~/.doodle/config.toml`

use doodle_core::{DoodleError, HardwareTier, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const HARDWARE_TIER_ENV: &str = "DOODLE_HARDWARE_TIER";
pub const CACHE_DIR_ENV: &str = "DOODLE_CACHE_DIR";

/// Provider-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Catalog voice id -> provider voice id
    #[serde(default)]
    pub voices: HashMap<String, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            enabled: true,
            voices: HashMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Image providers in fallback order
    #[serde(default = "default_image_providers")]
    pub image_providers: Vec<String>,
    /// Speech providers in fallback order
    #[serde(default = "default_speech_providers")]
    pub speech_providers: Vec<String>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Where providers write artifacts before the cache takes them
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Parallel image generations on `high_vram` hosts; other tiers use one
    #[serde(default = "default_max_image_workers")]
    pub max_image_workers: usize,
    /// Parallel speech generations; 0 uses the logical core count
    #[serde(default)]
    pub max_audio_workers: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            image_providers: default_image_providers(),
            speech_providers: default_speech_providers(),
            cache_dir: default_cache_dir(),
            scratch_dir: default_scratch_dir(),
            max_image_workers: default_max_image_workers(),
            max_audio_workers: 0,
        }
    }
}

fn default_image_providers() -> Vec<String> {
    vec!["flux".to_string(), "placeholder".to_string()]
}
fn default_speech_providers() -> Vec<String> {
    vec!["elevenlabs".to_string(), "placeholder".to_string()]
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(".doodle/cache")
}
fn default_scratch_dir() -> PathBuf {
    PathBuf::from(".doodle/scratch")
}
fn default_max_image_workers() -> usize {
    2
}

/// Hardware settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareSettings {
    /// Skip probing and use this tier
    #[serde(default)]
    pub tier: Option<HardwareTier>,
}

/// Top-level config file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoodleConfigFile {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub generation: Option<GenerationSettings>,
    #[serde(default)]
    pub hardware: HardwareSettings,
}

/// Resolved configuration with environment variable overrides applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoodleConfig {
    pub providers: HashMap<String, ProviderConfig>,
    pub generation: GenerationSettings,
    pub hardware: HardwareSettings,
}

impl DoodleConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut config = DoodleConfig::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                config.merge(Self::load_file(&global_path)?);
            }
        }

        let local_path = PathBuf::from(".doodle/config.toml");
        if local_path.exists() {
            config.merge(Self::load_file(&local_path)?);
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load config from a specific file path only (for testing)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = DoodleConfig::default();
        config.merge(Self::load_file(path)?);
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Get API key for a provider
    pub fn api_key(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_key.as_deref())
    }

    /// Get API URL for a provider (or its default)
    pub fn api_url(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_url.as_deref())
    }

    /// Check if a provider is enabled
    pub fn is_enabled(&self, provider_name: &str) -> bool {
        self.providers
            .get(provider_name)
            .map(|p| p.enabled)
            .unwrap_or(true)
    }

    /// Configured voice id mappings for a provider
    pub fn voice_map(&self, provider_name: &str) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.providers
            .get(provider_name)
            .into_iter()
            .flat_map(|p| p.voices.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".doodle").join("config.toml"))
    }

    fn load_file(path: &Path) -> Result<DoodleConfigFile> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            DoodleError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    fn merge(&mut self, overlay: DoodleConfigFile) {
        for (name, provider) in overlay.providers {
            let entry = self.providers.entry(name).or_default();
            if provider.api_key.is_some() {
                entry.api_key = provider.api_key;
            }
            if provider.api_url.is_some() {
                entry.api_url = provider.api_url;
            }
            entry.enabled = provider.enabled;
            entry.voices.extend(provider.voices);
        }

        // A [generation] table replaces the lower layer's wholesale; its
        // missing keys have already been filled with defaults by serde
        if let Some(generation) = overlay.generation {
            self.generation = generation;
        }

        if overlay.hardware.tier.is_some() {
            self.hardware.tier = overlay.hardware.tier;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        let provider_names = ["flux", "elevenlabs"];
        for name in &provider_names {
            let env_key = format!("DOODLE_{}_API_KEY", name.to_uppercase());
            if let Ok(key) = std::env::var(&env_key) {
                let entry = self.providers.entry(name.to_string()).or_default();
                entry.api_key = Some(key);
            }
        }

        if let Ok(tier) = std::env::var(HARDWARE_TIER_ENV) {
            if !tier.trim().is_empty() {
                self.hardware.tier = Some(tier.parse().map_err(|e| {
                    DoodleError::Config(format!("{}: {}", HARDWARE_TIER_ENV, e))
                })?);
            }
        }

        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.generation.cache_dir = PathBuf::from(dir);
            }
        }

        Ok(())
    }
}
