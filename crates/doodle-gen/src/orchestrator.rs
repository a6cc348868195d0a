//! Generation orchestrator
//!
//! Drives every scene of a script through image and speech generation.
//! Image and audio work run in two bounded pools at the same time; each
//! artifact goes through the content cache, so a key is produced at most
//! once no matter how many scenes ask for it. Failures are recorded per
//! artifact and never stop the rest of the run.

use crate::capability::{ImageCapability, ImageRequest, SpeechCapability};
use crate::config::GenerationSettings;
use crate::hardware::HardwareProfile;
use crate::outcome::{SceneOutcome, ScriptResult};
use crate::pool::{run_bounded, SchedulePlan};
use crate::preset::resolve_preset;
use crate::progress::{Artifact, CancellationToken, Phase, RunObserver, SceneTracker};
use doodle_cache::{compute_key, reference_identity, ArtifactKind, CacheKey, ContentCache, Resolution, SemanticInput};
use doodle_core::{ArtifactFailure, GenerationConfig, GenerationError, QualityLevel, SceneId, Script};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Per-run switches
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Reuse cached artifacts. When false every key is regenerated once
    /// per run and the fresh artifact replaces the cached one.
    pub use_cache: bool,
    pub cancellation: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cancellation: CancellationToken::new(),
        }
    }
}

struct ImageJob<'s> {
    scene_id: SceneId,
    key: CacheKey,
    request: ImageRequest<'s>,
}

struct AudioJob<'s> {
    scene_id: SceneId,
    key: CacheKey,
    text: &'s str,
}

/// State shared by every worker of one run
struct RunContext<'r> {
    config: GenerationConfig,
    options: &'r RunOptions,
    tracker: SceneTracker<'r>,
    /// Keys regenerated in this run when the cache is bypassed. Later
    /// requests for a refreshed key read the fresh entry instead of
    /// producing again.
    refreshed: Mutex<HashSet<CacheKey>>,
}

impl RunContext<'_> {
    fn use_cached(&self, key: &CacheKey) -> bool {
        self.options.use_cache || self.refreshed.lock().unwrap_or_else(|e| e.into_inner()).contains(key)
    }

    fn mark_refreshed(&self, key: &CacheKey) {
        if !self.options.use_cache {
            self.refreshed.lock().unwrap_or_else(|e| e.into_inner()).insert(*key);
        }
    }
}

/// Runs scripts against one cache and one pair of capabilities
pub struct Orchestrator<'a> {
    cache: &'a ContentCache,
    image: &'a dyn ImageCapability,
    speech: &'a dyn SpeechCapability,
    profile: HardwareProfile,
    plan: SchedulePlan,
    scratch_dir: PathBuf,
}

impl<'a> Orchestrator<'a> {
    /// Orchestrator with default scheduling for `profile`. Providers write
    /// into `<cache root>/scratch` until told otherwise.
    pub fn new(
        cache: &'a ContentCache,
        image: &'a dyn ImageCapability,
        speech: &'a dyn SpeechCapability,
        profile: HardwareProfile,
    ) -> Self {
        let plan = SchedulePlan::for_host(profile.tier, profile.logical_cores, &GenerationSettings::default());
        Self {
            cache,
            image,
            speech,
            profile,
            plan,
            scratch_dir: cache.root().join("scratch"),
        }
    }

    /// Take worker limits and the scratch directory from configuration
    pub fn with_settings(mut self, settings: &GenerationSettings) -> Self {
        self.plan = SchedulePlan::for_host(self.profile.tier, self.profile.logical_cores, settings);
        self.scratch_dir = settings.scratch_dir.clone();
        self
    }

    pub fn with_plan(mut self, plan: SchedulePlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn profile(&self) -> &HardwareProfile {
        &self.profile
    }

    pub fn plan(&self) -> SchedulePlan {
        self.plan
    }

    /// Generate every artifact of `script` at `level`.
    ///
    /// The generation config is resolved once and shared by all scenes.
    /// Never fails: capability errors, cancellation and worker panics all
    /// end up in the returned scene outcomes.
    pub fn run(
        &self,
        script: &Script,
        level: QualityLevel,
        options: &RunOptions,
        observer: &dyn RunObserver,
    ) -> ScriptResult {
        let config = resolve_preset(level, self.profile.tier);
        tracing::info!(
            title = script.title(),
            quality = %level,
            tier = %self.profile.tier,
            scenes = script.len(),
            image_workers = self.plan.image_workers,
            audio_workers = self.plan.audio_workers,
            use_cache = options.use_cache,
            "starting run"
        );

        let image_jobs: Vec<ImageJob<'_>> = script
            .scenes()
            .iter()
            .map(|scene| {
                let reference = scene.reference_image();
                let input = SemanticInput::image(scene.visual_description(), reference.map(reference_identity));
                ImageJob {
                    scene_id: scene.id(),
                    key: compute_key(ArtifactKind::Image, &input, &config),
                    request: ImageRequest {
                        description: scene.visual_description(),
                        reference,
                    },
                }
            })
            .collect();

        let audio_jobs: Vec<AudioJob<'_>> = script
            .scenes()
            .iter()
            .map(|scene| {
                let input = SemanticInput::speech(scene.narration(), script.voice());
                AudioJob {
                    scene_id: scene.id(),
                    key: compute_key(ArtifactKind::Audio, &input, &config),
                    text: scene.narration(),
                }
            })
            .collect();

        let ctx = RunContext {
            config,
            options,
            tracker: SceneTracker::new(script.scenes().iter().map(|s| s.id()), observer),
            refreshed: Mutex::new(HashSet::new()),
        };

        let image_work = |job: &ImageJob<'_>| {
            self.resolve_artifact(&ctx, job.scene_id, &job.key, Artifact::Image, || {
                self.image.generate_image(
                    &job.request,
                    &ctx.config,
                    &self.scratch_dir,
                    &options.cancellation,
                )
            })
        };
        let audio_work = |job: &AudioJob<'_>| {
            self.resolve_artifact(&ctx, job.scene_id, &job.key, Artifact::Audio, || {
                self.speech.synthesize_speech(
                    job.text,
                    script.voice(),
                    &ctx.config,
                    &self.scratch_dir,
                    &options.cancellation,
                )
            })
        };

        let (images, audio) = std::thread::scope(|s| {
            let images = s.spawn(|| run_bounded("image", &image_jobs, self.plan.image_workers, &image_work));
            let audio = run_bounded("audio", &audio_jobs, self.plan.audio_workers, &audio_work);
            let images = images.join().unwrap_or_else(|_| {
                image_jobs
                    .iter()
                    .map(|_| Err("image pool stopped".to_string()))
                    .collect()
            });
            (images, audio)
        });

        let scenes: Vec<SceneOutcome> = script
            .scenes()
            .iter()
            .zip(images.into_iter().zip(audio))
            .map(|(scene, (image, audio))| SceneOutcome {
                scene_id: scene.id(),
                image: settle(&ctx.tracker, scene.id(), Artifact::Image, image).into(),
                audio: settle(&ctx.tracker, scene.id(), Artifact::Audio, audio).into(),
            })
            .collect();

        let result = ScriptResult::new(
            script.title(),
            self.profile.tier,
            config,
            scenes,
            options.cancellation.is_cancelled(),
        );
        tracing::info!(
            generated = result.generated_count(),
            reused = result.cache_hit_count(),
            affected = ?result.affected_scenes(),
            cancelled = result.cancelled,
            "run finished"
        );
        result
    }

    fn resolve_artifact<F>(
        &self,
        ctx: &RunContext<'_>,
        scene_id: SceneId,
        key: &CacheKey,
        artifact: Artifact,
        produce: F,
    ) -> Result<Resolution, ArtifactFailure>
    where
        F: FnOnce() -> Result<PathBuf, GenerationError>,
    {
        ctx.tracker.advance(scene_id, artifact, Phase::Resolving);

        let result = if ctx.options.cancellation.is_cancelled() {
            Err(ArtifactFailure::Cancelled)
        } else {
            tracing::debug!(scene = %scene_id, key = %key, "resolving artifact");
            let cancellation = &ctx.options.cancellation;
            self.cache.get_or_produce_with(
                key,
                scene_id,
                || ctx.use_cached(key),
                || {
                    // Cancellation may arrive while waiting for a worker slot
                    if cancellation.is_cancelled() {
                        return Err(ArtifactFailure::Cancelled);
                    }
                    match produce() {
                        Ok(path) => {
                            ctx.mark_refreshed(key);
                            Ok(path)
                        }
                        // A call cut short by cancellation is not a capability fault
                        Err(_) if cancellation.is_cancelled() => Err(ArtifactFailure::Cancelled),
                        Err(e) => Err(e.into()),
                    }
                },
            )
        };

        match &result {
            Ok(resolution) => {
                tracing::info!(
                    scene = %scene_id,
                    kind = %key.kind,
                    source = resolution.source.as_str(),
                    path = %resolution.path.display(),
                    "artifact ready"
                );
                ctx.tracker.advance(scene_id, artifact, Phase::Ready);
            }
            Err(failure) => {
                tracing::warn!(scene = %scene_id, kind = %key.kind, %failure, "artifact failed");
                ctx.tracker.advance(scene_id, artifact, Phase::Failed);
            }
        }
        result
    }
}

/// Turn a pool result into an artifact result, failing the artifact if its
/// worker panicked before reporting
fn settle(
    tracker: &SceneTracker<'_>,
    scene_id: SceneId,
    artifact: Artifact,
    result: Result<Result<Resolution, ArtifactFailure>, String>,
) -> Result<Resolution, ArtifactFailure> {
    result.unwrap_or_else(|message| {
        tracing::error!(scene = %scene_id, %message, "generation worker panicked");
        tracker.advance(scene_id, artifact, Phase::Failed);
        Err(ArtifactFailure::Interrupted { message })
    })
}

/// Scratch files left by providers whose output was never cached
pub fn clean_scratch(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    removed
}
