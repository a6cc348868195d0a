//! Hardware and preset inspection command

use anyhow::Result;
use doodle_core::QualityLevel;
use doodle_gen::hardware::process_profile;
use doodle_gen::{resolve_preset, DoodleConfig, SchedulePlan};
use std::process::ExitCode;

pub fn run(format: &str) -> Result<ExitCode> {
    let config = DoodleConfig::load()?;
    let profile = process_profile(config.hardware.tier);
    let plan = SchedulePlan::for_host(profile.tier, profile.logical_cores, &config.generation);
    let presets: Vec<_> = QualityLevel::ALL
        .iter()
        .map(|&level| resolve_preset(level, profile.tier))
        .collect();

    match format {
        "json" => {
            let report = serde_json::json!({
                "profile": profile,
                "plan": plan,
                "presets": presets,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "text" => {
            println!("Hardware tier: {} ({:?})", profile.tier, profile.source);
            println!("  logical cores: {}", profile.logical_cores);
            match profile.accelerator_memory_mb {
                Some(mb) => println!("  accelerator memory: {} MiB", mb),
                None => println!("  accelerator memory: none"),
            }
            println!(
                "  workers: {} image, {} audio",
                plan.image_workers, plan.audio_workers
            );
            println!("Presets:");
            for preset in &presets {
                println!(
                    "  {:<9} steps={:<3} resolution={} quantize={:<5} guidance={} scheduler={}",
                    preset.quality.as_str(),
                    preset.steps,
                    preset.resolution,
                    preset.quantize,
                    preset.guidance_scale,
                    preset.scheduler.as_str()
                );
            }
        }
        other => anyhow::bail!("Unknown format '{}'. Use: text, json", other),
    }

    Ok(ExitCode::SUCCESS)
}
