//! Offline placeholder providers
//!
//! Produce stand-in artifacts without any model or network: a flat PNG
//! tinted from the prompt (or a greyscale trace of the reference image)
//! and silent WAV narration sized to the text. Used for offline runs and as
//! the last entry of the default fallback chains.

use crate::capability::{ensure_output_dir, scratch_path, ImageCapability, ImageRequest, SpeechCapability};
use crate::progress::CancellationToken;
use crate::voice;
use doodle_core::{ContentHash, GenerationConfig, GenerationError};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Speaking rate used to size silent narration
const WORDS_PER_SECOND: f64 = 2.5;
const MIN_SPEECH_SECS: f64 = 1.0;

/// Placeholder image provider
#[derive(Default)]
pub struct PlaceholderImage;

impl PlaceholderImage {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCapability for PlaceholderImage {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn generate_image(
        &self,
        request: &ImageRequest<'_>,
        config: &GenerationConfig,
        output_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<PathBuf, GenerationError> {
        if request.description.trim().is_empty() {
            return Err(GenerationError::invalid_input("Empty visual description"));
        }
        if config.resolution == 0 {
            return Err(GenerationError::invalid_input("Resolution must be positive"));
        }
        ensure_output_dir(output_dir)?;

        let size = config.resolution;
        let traced = request.reference.and_then(|reference| match image::open(reference) {
            Ok(img) => Some(
                img.resize_exact(size, size, image::imageops::FilterType::Triangle)
                    .grayscale()
                    .to_rgb8(),
            ),
            Err(e) => {
                tracing::warn!(reference = %reference.display(), error = %e, "reference image unreadable; drawing unguided");
                None
            }
        });
        let img = traced.unwrap_or_else(|| {
            let [r, g, b] = tint(request.description);
            image::RgbImage::from_pixel(size, size, image::Rgb([r, g, b]))
        });

        let path = scratch_path(output_dir, "placeholder", "png");
        img.save(&path)
            .map_err(|e| GenerationError::model_load(format!("Failed to save PNG: {}", e)))?;
        Ok(path)
    }
}

/// Light colour derived from the prompt, so different scenes are told apart
fn tint(description: &str) -> [u8; 3] {
    let hash = ContentHash::from_str(description);
    let bytes = hash.as_bytes();
    [128 + bytes[0] / 2, 128 + bytes[1] / 2, 128 + bytes[2] / 2]
}

/// Placeholder speech provider producing silence
#[derive(Default)]
pub struct PlaceholderSpeech;

impl PlaceholderSpeech {
    pub fn new() -> Self {
        Self
    }
}

/// Length of silent narration for `text`
pub fn silence_duration(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    (words / WORDS_PER_SECOND).max(MIN_SPEECH_SECS)
}

impl SpeechCapability for PlaceholderSpeech {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn synthesize_speech(
        &self,
        text: &str,
        voice: &str,
        config: &GenerationConfig,
        output_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<PathBuf, GenerationError> {
        voice::require(voice)?;
        if text.trim().is_empty() {
            return Err(GenerationError::invalid_input("Empty narration text"));
        }
        if config.sample_rate == 0 {
            return Err(GenerationError::invalid_input("Sample rate must be positive"));
        }
        ensure_output_dir(output_dir)?;

        let samples = (config.sample_rate as f64 * silence_duration(text)) as usize;
        let path = scratch_path(output_dir, "placeholder", "wav");
        write_pcm_wav(&path, config.sample_rate, &vec![0u8; samples * 2])
            .map_err(|e| GenerationError::model_load(format!("Failed to write WAV: {}", e)))?;
        Ok(path)
    }
}

/// Write 16-bit mono little-endian PCM as a WAV file
pub(crate) fn write_pcm_wav(path: &Path, sample_rate: u32, pcm: &[u8]) -> std::io::Result<()> {
    let num_channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let data_size = pcm.len() as u32;

    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);

    // RIFF header
    file.write_all(b"RIFF")?;
    file.write_all(&(36 + data_size).to_le_bytes())?;
    file.write_all(b"WAVE")?;

    // fmt chunk
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?; // PCM
    file.write_all(&num_channels.to_le_bytes())?;
    file.write_all(&sample_rate.to_le_bytes())?;
    let block_align = num_channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * block_align as u32;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&bits_per_sample.to_le_bytes())?;

    // data chunk
    file.write_all(b"data")?;
    file.write_all(&data_size.to_le_bytes())?;
    file.write_all(pcm)?;
    file.flush()
}
