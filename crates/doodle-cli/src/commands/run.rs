//! Script generation command

use super::exit_code_for_result;
use anyhow::{Context, Result};
use doodle_cache::ContentCache;
use doodle_core::{QualityLevel, Script};
use doodle_gen::hardware::process_profile;
use doodle_gen::{
    providers, ArtifactOutcome, CancellationToken, DoodleConfig, LogObserver, Orchestrator, RunManifest, RunOptions,
    ScriptResult,
};
use std::path::PathBuf;
use std::process::ExitCode;

pub struct RunArgs {
    pub input: PathBuf,
    pub quality: QualityLevel,
    pub no_cache: bool,
    pub manifest: Option<PathBuf>,
    pub format: String,
}

pub fn run(args: RunArgs) -> Result<ExitCode> {
    if args.format != "text" && args.format != "json" {
        anyhow::bail!("Unknown format '{}'. Use: text, json", args.format);
    }

    let script = Script::load(&args.input)?;
    for (scene, path) in script.missing_reference_images() {
        tracing::warn!(scene = %scene, path = %path.display(), "reference image not found; generating without it");
    }

    let config = DoodleConfig::load()?;
    let profile = process_profile(config.hardware.tier);
    let cache = ContentCache::open(&config.generation.cache_dir)
        .with_context(|| format!("Failed to open cache at {}", config.generation.cache_dir.display()))?;
    let image = providers::image_chain(&config)?;
    let speech = providers::speech_chain(&config)?;
    tracing::debug!(image = ?image.names(), speech = ?speech.names(), "provider chains");

    let orchestrator = Orchestrator::new(&cache, &image, &speech, profile).with_settings(&config.generation);
    let options = RunOptions {
        use_cache: !args.no_cache,
        ..RunOptions::default()
    };
    cancel_on_interrupt(options.cancellation.clone());
    let result = orchestrator.run(&script, args.quality, &options, &LogObserver);

    let manifest_path = args
        .manifest
        .unwrap_or_else(|| RunManifest::default_path(script.title()));
    let manifest_saved = match RunManifest::from_result(&result).save(&manifest_path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %manifest_path.display(), error = %e, "could not write run manifest");
            false
        }
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_report(&result);
        if manifest_saved {
            println!("Manifest: {}", manifest_path.display());
        }
    }

    Ok(exit_code_for_result(&result))
}

/// Cancel the run on the first Ctrl-C and exit on the second.
///
/// Cancelled runs still write their manifest and report, so finished
/// artifacts are not lost.
fn cancel_on_interrupt(token: CancellationToken) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(error = %e, "could not listen for interrupts; Ctrl-C will not cancel gracefully");
            return;
        }
    };

    let listener = std::thread::Builder::new()
        .name("doodle-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "could not listen for interrupts");
                    return;
                }
                tracing::warn!("interrupt received; finishing started work (Ctrl-C again to abort)");
                token.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            })
        });
    if let Err(e) = listener {
        tracing::warn!(error = %e, "could not start interrupt listener");
    }
}

fn print_report(result: &ScriptResult) {
    let config = &result.config;
    println!(
        "{} [{} on {}] steps={} resolution={} quantize={}",
        result.title, config.quality, result.tier, config.steps, config.resolution, config.quantize
    );

    for scene in &result.scenes {
        println!(
            "  scene {:<3} {:<8} image: {}  audio: {}",
            scene.scene_id.to_string(),
            scene.status().as_str(),
            describe(&scene.image),
            describe(&scene.audio)
        );
    }

    println!(
        "{} generated, {} reused",
        result.generated_count(),
        result.cache_hit_count()
    );
    if result.cancelled {
        println!("Run was cancelled before every artifact was attempted.");
    }
    if result.is_success() {
        println!("Result: success");
    } else {
        let affected: Vec<String> = result.affected_scenes().iter().map(|id| id.to_string()).collect();
        println!("Result: partial failure (scenes {})", affected.join(", "));
    }
}

fn describe(outcome: &ArtifactOutcome) -> String {
    match (outcome.source(), outcome.failure()) {
        (Some(source), _) => source.as_str().to_string(),
        (None, Some(failure)) => format!("FAILED ({})", failure),
        (None, None) => "-".to_string(),
    }
}
