//! Flux image provider (fal.ai)
//!
//! Renders scene images through the Flux API with the doodle line-art
//! style appended to every prompt. Generation blocks until the image has
//! been downloaded.

use super::http::send_with_retry;
use crate::capability::{ensure_output_dir, scratch_path, ImageCapability, ImageRequest};
use crate::config::DoodleConfig;
use crate::progress::CancellationToken;
use doodle_core::{DoodleError, GenerationConfig, GenerationError, Result};
use std::path::{Path, PathBuf};

const DEFAULT_FLUX_URL: &str = "https://fal.run/fal-ai/flux/dev";

/// Style suffix giving every scene the same hand-drawn look
pub const DOODLE_STYLE: &str = "simple line drawing, hand-drawn sketch, whiteboard doodle, \
black and white lineart, minimalist illustration, educational diagram style";

pub const NEGATIVE_PROMPT: &str = "photo, photograph, realistic, detailed shading, complex background, \
3d render, colorful, painting, watercolor";

/// Flux provider for doodle-style scene images
pub struct FluxProvider {
    api_key: String,
    api_url: String,
}

impl FluxProvider {
    /// Create a new FluxProvider from config
    pub fn from_config(config: &DoodleConfig) -> Result<Self> {
        let api_key = config
            .api_key("flux")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                DoodleError::Config(
                    "Flux API key not configured. Set DOODLE_FLUX_API_KEY or add to .doodle/config.toml"
                        .to_string(),
                )
            })?
            .to_string();

        let api_url = config.api_url("flux").unwrap_or(DEFAULT_FLUX_URL).to_string();

        Ok(Self { api_key, api_url })
    }

    fn submit(
        &self,
        payload: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> std::result::Result<serde_json::Value, GenerationError> {
        let bytes = send_with_retry("flux", cancel, |agent| {
            agent
                .post(&self.api_url)
                .header("Authorization", &format!("Key {}", self.api_key))
                .header("Content-Type", "application/json")
                .send_json(payload)
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| GenerationError::model_load(format!("Failed to parse Flux response: {}", e)))
    }

    fn download(
        &self,
        url: &str,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), GenerationError> {
        let bytes = send_with_retry("flux", cancel, |agent| agent.get(url).call())?;
        std::fs::write(output_path, &bytes).map_err(|e| {
            GenerationError::model_load(format!("Failed to write {}: {}", output_path.display(), e))
        })
    }
}

/// Description plus the doodle style suffix
pub fn build_prompt(description: &str) -> String {
    format!("{}, {}", description.trim(), DOODLE_STYLE)
}

/// Request body for one image at the resolved settings
pub fn build_payload(description: &str, config: &GenerationConfig) -> serde_json::Value {
    serde_json::json!({
        "prompt": build_prompt(description),
        "negative_prompt": NEGATIVE_PROMPT,
        "image_size": {
            "width": config.resolution,
            "height": config.resolution
        },
        "num_inference_steps": config.steps,
        "guidance_scale": config.guidance_scale,
        "num_images": 1,
        "enable_safety_checker": false
    })
}

/// Extract the first image URL from a Flux response
pub fn parse_flux_response(response: &serde_json::Value) -> Option<&str> {
    response
        .get("images")
        .and_then(|imgs| imgs.as_array())
        .and_then(|arr| arr.first())
        .and_then(|img| img.get("url"))
        .and_then(|u| u.as_str())
}

impl ImageCapability for FluxProvider {
    fn name(&self) -> &str {
        "flux"
    }

    fn generate_image(
        &self,
        request: &ImageRequest<'_>,
        config: &GenerationConfig,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<PathBuf, GenerationError> {
        if request.description.trim().is_empty() {
            return Err(GenerationError::invalid_input("Empty visual description"));
        }
        if let Some(reference) = request.reference {
            tracing::debug!(reference = %reference.display(), "flux ignores reference images");
        }
        ensure_output_dir(output_dir)?;

        let response = self.submit(&build_payload(request.description, config), cancel)?;
        let url = parse_flux_response(&response).ok_or_else(|| {
            GenerationError::model_load(format!(
                "Unexpected Flux response format: {}",
                serde_json::to_string(&response).unwrap_or_default()
            ))
        })?;

        let output_path = scratch_path(output_dir, "flux", "png");
        self.download(url, &output_path, cancel)?;
        Ok(output_path)
    }
}
