//! Hardware profile resolution
//!
//! Classifies the host into a [`HardwareTier`] from its accelerator memory.
//! Resolution never fails: a probe error degrades to `CpuOnly`.

use doodle_core::{DoodleError, HardwareTier, Result};
use serde::Serialize;
use std::io::ErrorKind;
use std::process::Command;
use std::sync::OnceLock;

/// Accelerators below this much memory are `LowVram`
pub const LOW_VRAM_LIMIT_MB: u64 = 4096;

/// How the tier was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    /// Set by `DOODLE_HARDWARE_TIER` or `[hardware] tier`
    Override,
    Probed,
    /// Probing failed; assumed the slowest tier
    Degraded,
}

/// Compute resources available to this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HardwareProfile {
    pub tier: HardwareTier,
    pub logical_cores: usize,
    /// Largest accelerator memory found, in MiB
    pub accelerator_memory_mb: Option<u64>,
    pub source: ProfileSource,
}

type ProbeFn = fn() -> Result<Option<u64>>;

/// Resolves the host's [`HardwareProfile`]
pub struct HardwareResolver {
    override_tier: Option<HardwareTier>,
    probe: ProbeFn,
}

impl HardwareResolver {
    /// Resolver probing with `nvidia-smi`, unless `override_tier` is set
    pub fn new(override_tier: Option<HardwareTier>) -> Self {
        Self {
            override_tier,
            probe: probe_nvidia_smi,
        }
    }

    /// Resolver with a custom accelerator probe
    pub fn with_probe(override_tier: Option<HardwareTier>, probe: ProbeFn) -> Self {
        Self { override_tier, probe }
    }

    pub fn resolve(&self) -> HardwareProfile {
        let logical_cores = num_cpus::get().max(1);

        if let Some(tier) = self.override_tier {
            tracing::info!(tier = %tier, "hardware tier overridden");
            return HardwareProfile {
                tier,
                logical_cores,
                accelerator_memory_mb: None,
                source: ProfileSource::Override,
            };
        }

        match (self.probe)() {
            Ok(memory) => {
                let tier = classify(memory);
                tracing::info!(tier = %tier, accelerator_mb = ?memory, logical_cores, "hardware probed");
                HardwareProfile {
                    tier,
                    logical_cores,
                    accelerator_memory_mb: memory,
                    source: ProfileSource::Probed,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "hardware probe failed; assuming cpu_only");
                HardwareProfile {
                    tier: HardwareTier::CpuOnly,
                    logical_cores,
                    accelerator_memory_mb: None,
                    source: ProfileSource::Degraded,
                }
            }
        }
    }
}

/// Profile of this process, resolved on first call and fixed afterwards.
///
/// Later calls return the first result whatever override they pass.
pub fn process_profile(override_tier: Option<HardwareTier>) -> HardwareProfile {
    static PROFILE: OnceLock<HardwareProfile> = OnceLock::new();
    *PROFILE.get_or_init(|| HardwareResolver::new(override_tier).resolve())
}

/// Tier for a given amount of accelerator memory
pub fn classify(accelerator_memory_mb: Option<u64>) -> HardwareTier {
    match accelerator_memory_mb {
        None => HardwareTier::CpuOnly,
        Some(mb) if mb < LOW_VRAM_LIMIT_MB => HardwareTier::LowVram,
        Some(_) => HardwareTier::HighVram,
    }
}

/// Query total accelerator memory through `nvidia-smi`.
///
/// A missing binary means no accelerator; any other failure is an error.
fn probe_nvidia_smi() -> Result<Option<u64>> {
    let output = match Command::new("nvidia-smi")
        .args(["--query-gpu=memory.total", "--format=csv,noheader,nounits"])
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DoodleError::HardwareProbe(format!("Cannot run nvidia-smi: {}", e))),
    };

    if !output.status.success() {
        return Err(DoodleError::HardwareProbe(format!(
            "nvidia-smi exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
}

/// Largest per-device memory (MiB) in `nvidia-smi` CSV output
pub fn parse_nvidia_smi(output: &str) -> Result<Option<u64>> {
    let mut largest = None;
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mb: u64 = line.parse().map_err(|_| {
            DoodleError::HardwareProbe(format!("Unexpected nvidia-smi output line '{}'", line))
        })?;
        largest = largest.max(Some(mb));
    }
    Ok(largest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify(None), HardwareTier::CpuOnly);
        assert_eq!(classify(Some(2048)), HardwareTier::LowVram);
        assert_eq!(classify(Some(4095)), HardwareTier::LowVram);
        assert_eq!(classify(Some(4096)), HardwareTier::HighVram);
        assert_eq!(classify(Some(24576)), HardwareTier::HighVram);
    }

    #[test]
    fn test_parse_nvidia_smi() {
        assert_eq!(parse_nvidia_smi("8192\n").unwrap(), Some(8192));
        assert_eq!(parse_nvidia_smi("2048\n 12288 \n").unwrap(), Some(12288));
        assert_eq!(parse_nvidia_smi("").unwrap(), None);
        assert!(parse_nvidia_smi("[N/A]\n").is_err());
    }

    #[test]
    fn test_override_skips_probe() {
        fn exploding_probe() -> Result<Option<u64>> {
            panic!("probe must not run when overridden");
        }
        let profile = HardwareResolver::with_probe(Some(HardwareTier::HighVram), exploding_probe).resolve();
        assert_eq!(profile.tier, HardwareTier::HighVram);
        assert_eq!(profile.source, ProfileSource::Override);
        assert!(profile.logical_cores >= 1);
    }

    #[test]
    fn test_probe_error_degrades_to_cpu_only() {
        fn failing_probe() -> Result<Option<u64>> {
            Err(DoodleError::HardwareProbe("driver mismatch".into()))
        }
        let profile = HardwareResolver::with_probe(None, failing_probe).resolve();
        assert_eq!(profile.tier, HardwareTier::CpuOnly);
        assert_eq!(profile.source, ProfileSource::Degraded);
    }

    #[test]
    fn test_probed_memory_sets_tier() {
        fn small_gpu() -> Result<Option<u64>> {
            Ok(Some(2048))
        }
        let profile = HardwareResolver::with_probe(None, small_gpu).resolve();
        assert_eq!(profile.tier, HardwareTier::LowVram);
        assert_eq!(profile.accelerator_memory_mb, Some(2048));
    }
}
