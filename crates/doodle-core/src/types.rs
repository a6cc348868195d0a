//! Generation settings shared by the cache and the pipeline

use crate::error::DoodleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested trade-off between generation speed and fidelity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Fast,
    #[default]
    Balanced,
    High,
}

impl QualityLevel {
    pub const ALL: [QualityLevel; 3] = [QualityLevel::Fast, QualityLevel::Balanced, QualityLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Fast => "fast",
            QualityLevel::Balanced => "balanced",
            QualityLevel::High => "high",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = DoodleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(QualityLevel::Fast),
            "balanced" => Ok(QualityLevel::Balanced),
            "high" => Ok(QualityLevel::High),
            other => Err(DoodleError::Config(format!(
                "Unknown quality level '{}'. Use: fast, balanced, high",
                other
            ))),
        }
    }
}

/// Coarse classification of the host's compute resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareTier {
    /// No usable accelerator
    CpuOnly,
    /// Accelerator with less than 4 GB of memory
    LowVram,
    /// Accelerator with at least 4 GB of memory
    HighVram,
}

impl HardwareTier {
    pub const ALL: [HardwareTier; 3] = [HardwareTier::CpuOnly, HardwareTier::LowVram, HardwareTier::HighVram];

    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareTier::CpuOnly => "cpu_only",
            HardwareTier::LowVram => "low_vram",
            HardwareTier::HighVram => "high_vram",
        }
    }
}

impl fmt::Display for HardwareTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HardwareTier {
    type Err = DoodleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "cpu_only" | "cpu" => Ok(HardwareTier::CpuOnly),
            "low_vram" => Ok(HardwareTier::LowVram),
            "high_vram" => Ok(HardwareTier::HighVram),
            other => Err(DoodleError::Config(format!(
                "Unknown hardware tier '{}'. Use: cpu_only, low_vram, high_vram",
                other
            ))),
        }
    }
}

/// Diffusion sampling scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduler {
    /// Latent consistency sampling, usable at very low step counts
    Lcm,
    UniPc,
}

impl Scheduler {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheduler::Lcm => "lcm",
            Scheduler::UniPc => "unipc",
        }
    }
}

/// Fully resolved generation settings for one run.
///
/// Produced by the preset resolver and never modified afterwards. Every
/// field participates in cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub quality: QualityLevel,
    pub steps: u32,
    /// Square output edge in pixels
    pub resolution: u32,
    pub quantize: bool,
    pub guidance_scale: f32,
    pub scheduler: Scheduler,
    /// Speech output sample rate in Hz
    pub sample_rate: u32,
}

impl GenerationConfig {
    /// Canonical text form of every field, in a fixed order.
    ///
    /// The guidance scale is written through its bit pattern so the
    /// encoding never depends on float formatting.
    pub fn fingerprint(&self) -> String {
        format!(
            "quality={};steps={};resolution={};quantize={};guidance={:08x};scheduler={};sample_rate={}",
            self.quality,
            self.steps,
            self.resolution,
            self.quantize,
            self.guidance_scale.to_bits(),
            self.scheduler.as_str(),
            self.sample_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GenerationConfig {
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
    fn test_quality_parse() {
        assert_eq!("fast".parse::<QualityLevel>().unwrap(), QualityLevel::Fast);
        assert_eq!("HIGH".parse::<QualityLevel>().unwrap(), QualityLevel::High);
        assert!("ultra".parse::<QualityLevel>().is_err());
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("cpu_only".parse::<HardwareTier>().unwrap(), HardwareTier::CpuOnly);
        assert_eq!("low-vram".parse::<HardwareTier>().unwrap(), HardwareTier::LowVram);
        assert!("quantum".parse::<HardwareTier>().is_err());
    }

    #[test]
    fn test_tier_serde_names() {
        let json = serde_json::to_string(&HardwareTier::HighVram).unwrap();
        assert_eq!(json, "\"high_vram\"");
    }

    #[test]
    fn test_fingerprint_changes_with_each_field() {
        let base = sample();
        let variants = [
            GenerationConfig { quality: QualityLevel::Balanced, ..base },
            GenerationConfig { steps: 5, ..base },
            GenerationConfig { resolution: 768, ..base },
            GenerationConfig { quantize: false, ..base },
            GenerationConfig { guidance_scale: 7.5, ..base },
            GenerationConfig { scheduler: Scheduler::UniPc, ..base },
            GenerationConfig { sample_rate: 44100, ..base },
        ];
        for variant in variants {
            assert_ne!(variant.fingerprint(), base.fingerprint());
        }
        assert_eq!(sample().fingerprint(), base.fingerprint());
    }
}
