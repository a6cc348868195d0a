//! Quality preset resolution
//!
//! Maps a requested quality level and the host's hardware tier onto one
//! immutable [`GenerationConfig`]. Lower tiers get quantization and the
//! smaller resolution instead of a configuration they cannot run.

use doodle_core::{GenerationConfig, HardwareTier, QualityLevel, Scheduler};

/// Speech sample rate shared by every preset
pub const SAMPLE_RATE: u32 = 22050;

const BASE_RESOLUTION: u32 = 512;
const HIGH_RESOLUTION: u32 = 768;

/// Resolve the generation config for `level` on a `tier` host.
///
/// Total over both enums and free of side effects.
pub fn resolve_preset(level: QualityLevel, tier: HardwareTier) -> GenerationConfig {
    let high_vram = tier == HardwareTier::HighVram;

    let (steps, resolution, guidance_scale, scheduler) = match level {
        QualityLevel::Fast => (4, BASE_RESOLUTION, 1.0, Scheduler::Lcm),
        QualityLevel::Balanced => (20, BASE_RESOLUTION, 7.5, Scheduler::UniPc),
        QualityLevel::High if high_vram => (50, HIGH_RESOLUTION, 7.5, Scheduler::UniPc),
        QualityLevel::High => (50, BASE_RESOLUTION, 7.5, Scheduler::UniPc),
    };

    GenerationConfig {
        quality: level,
        steps,
        resolution,
        quantize: !high_vram,
        guidance_scale,
        scheduler,
        sample_rate: SAMPLE_RATE,
    }
}
