//! Script validation command

use anyhow::Result;
use doodle_core::{DurationMode, Script};
use doodle_gen::voice;
use std::path::Path;
use std::process::ExitCode;

pub fn run(path: &Path) -> Result<ExitCode> {
    let script = Script::load(path)?;

    println!("Script: {}", script.title());
    println!("  language: {}", script.language());
    match voice::find(script.voice()) {
        Some(v) => println!("  voice: {} ({})", v.id, v.description),
        None => println!("  voice: {} (unknown; speech will fail)", script.voice()),
    }
    println!("  scenes: {}", script.len());

    for scene in script.scenes() {
        let duration = match scene.duration() {
            DurationMode::Auto => "auto".to_string(),
            DurationMode::Seconds(secs) => format!("{}s", secs),
        };
        println!(
            "  [{}] {} words, duration {}: {}",
            scene.id(),
            scene.narration().split_whitespace().count(),
            duration,
            scene.visual_description()
        );
    }

    let missing = script.missing_reference_images();
    if !missing.is_empty() {
        println!("Warnings:");
        for (scene, path) in &missing {
            println!("  scene {}: reference image {} not found", scene, path.display());
        }
    }

    println!("Valid.");
    Ok(ExitCode::SUCCESS)
}
