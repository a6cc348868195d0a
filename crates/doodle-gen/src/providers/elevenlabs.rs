//! ElevenLabs speech provider
//!
//! Narrates scene text through the ElevenLabs text-to-speech API. Audio is
//! requested as raw PCM at the resolved sample rate and wrapped in a WAV
//! container so every speech provider yields the same format.

use super::http::send_with_retry;
use super::placeholder::write_pcm_wav;
use crate::capability::{ensure_output_dir, scratch_path, SpeechCapability};
use crate::config::DoodleConfig;
use crate::progress::CancellationToken;
use crate::voice;
use doodle_core::{DoodleError, GenerationConfig, GenerationError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_ELEVENLABS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const MODEL_ID: &str = "eleven_multilingual_v2";

/// PCM sample rates the API can return
const PCM_RATES: [u32; 4] = [16000, 22050, 24000, 44100];

/// Premade voices standing in for each catalog voice
const DEFAULT_VOICE_IDS: &[(&str, &str)] = &[
    ("female_us", "21m00Tcm4TlvDq8ikWAM"),
    ("male_us", "pNInz6obpgDQGcFmaJgB"),
    ("female_uk", "ThT5KcBeYPX3keUQqHPh"),
    ("male_uk", "onwK4e9ZLuTAKqWW03F9"),
    ("neutral", "EXAVITQu4vr4xnSDxMaL"),
    ("female_latam", "21m00Tcm4TlvDq8ikWAM"),
    ("male_latam", "pNInz6obpgDQGcFmaJgB"),
    ("female_es", "ThT5KcBeYPX3keUQqHPh"),
    ("male_es", "onwK4e9ZLuTAKqWW03F9"),
];

/// ElevenLabs provider for narration
pub struct ElevenLabsProvider {
    api_key: String,
    api_url: String,
    voice_ids: HashMap<String, String>,
}

impl ElevenLabsProvider {
    /// Create a new ElevenLabsProvider from config
    pub fn from_config(config: &DoodleConfig) -> Result<Self> {
        let api_key = config
            .api_key("elevenlabs")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                DoodleError::Config(
                    "ElevenLabs API key not configured. Set DOODLE_ELEVENLABS_API_KEY or add to .doodle/config.toml"
                        .to_string(),
                )
            })?
            .to_string();

        let api_url = config
            .api_url("elevenlabs")
            .unwrap_or(DEFAULT_ELEVENLABS_URL)
            .trim_end_matches('/')
            .to_string();

        let mut voice_ids: HashMap<String, String> = DEFAULT_VOICE_IDS
            .iter()
            .map(|(ours, theirs)| (ours.to_string(), theirs.to_string()))
            .collect();
        voice_ids.extend(
            config
                .voice_map("elevenlabs")
                .map(|(ours, theirs)| (ours.to_string(), theirs.to_string())),
        );

        Ok(Self {
            api_key,
            api_url,
            voice_ids,
        })
    }

    fn voice_id(&self, voice: &str) -> std::result::Result<&str, GenerationError> {
        voice::require(voice)?;
        self.voice_ids.get(voice).map(String::as_str).ok_or_else(|| {
            GenerationError::unsupported_language(format!("No ElevenLabs voice mapped for '{}'", voice))
        })
    }
}

/// Closest sample rate the API supports, rounding down where possible
pub fn pcm_rate(requested: u32) -> u32 {
    PCM_RATES
        .iter()
        .rev()
        .copied()
        .find(|&rate| rate <= requested)
        .unwrap_or(PCM_RATES[0])
}

impl SpeechCapability for ElevenLabsProvider {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn synthesize_speech(
        &self,
        text: &str,
        voice: &str,
        config: &GenerationConfig,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<PathBuf, GenerationError> {
        if text.trim().is_empty() {
            return Err(GenerationError::invalid_input("Empty narration text"));
        }
        let voice_id = self.voice_id(voice)?;
        ensure_output_dir(output_dir)?;

        let rate = pcm_rate(config.sample_rate);
        let url = format!("{}/{}?output_format=pcm_{}", self.api_url, voice_id, rate);
        let payload = serde_json::json!({
            "text": text,
            "model_id": MODEL_ID
        });

        let pcm = send_with_retry("elevenlabs", cancel, |agent| {
            agent
                .post(&url)
                .header("xi-api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .send_json(&payload)
        })?;
        if pcm.is_empty() {
            return Err(GenerationError::model_load("ElevenLabs returned no audio"));
        }

        let output_path = scratch_path(output_dir, "elevenlabs", "wav");
        write_pcm_wav(&output_path, rate, &pcm).map_err(|e| {
            GenerationError::model_load(format!("Failed to write {}: {}", output_path.display(), e))
        })?;
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use doodle_core::{GenerationErrorKind, HardwareTier, QualityLevel};

    fn provider_with(voices: &[(&str, &str)]) -> ElevenLabsProvider {
        let mut config = DoodleConfig::default();
        config.providers.insert(
            "elevenlabs".to_string(),
            ProviderConfig {
                api_key: Some("xi-test".to_string()),
                voices: voices.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect(),
                ..ProviderConfig::default()
            },
        );
        ElevenLabsProvider::from_config(&config).unwrap()
    }

    #[test]
    fn test_every_catalog_voice_has_a_default_mapping() {
        let provider = provider_with(&[]);
        for v in voice::VOICES {
            assert!(provider.voice_id(v.id).is_ok(), "{} is mapped", v.id);
        }
    }

    #[test]
    fn test_configured_voice_overrides_default() {
        let provider = provider_with(&[("female_us", "custom-voice")]);
        assert_eq!(provider.voice_id("female_us").unwrap(), "custom-voice");
    }

    #[test]
    fn test_unknown_voice_rejected_before_request() {
        let provider = provider_with(&[]);
        let config = crate::preset::resolve_preset(QualityLevel::Fast, HardwareTier::CpuOnly);
        let cancel = CancellationToken::new();
        let err = provider
            .synthesize_speech("hola", "robot", &config, Path::new("/nonexistent"), &cancel)
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::UnsupportedLanguage);
    }

    #[test]
    fn test_pcm_rate_selection() {
        assert_eq!(pcm_rate(22050), 22050);
        assert_eq!(pcm_rate(48000), 44100);
        assert_eq!(pcm_rate(23000), 22050);
        assert_eq!(pcm_rate(8000), 16000);
    }
}
