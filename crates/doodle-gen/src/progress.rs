//! Scene progress tracking, observation and cancellation

use doodle_core::SceneId;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Where a scene is in its generation lifecycle.
///
/// Scenes move strictly forward through
/// `Pending → ImageResolving → ImageReady|ImageFailed → AudioResolving →
/// AudioReady|AudioFailed → Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneState {
    Pending,
    ImageResolving,
    ImageReady,
    ImageFailed,
    AudioResolving,
    AudioReady,
    AudioFailed,
    Done,
}

impl SceneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneState::Pending => "pending",
            SceneState::ImageResolving => "image_resolving",
            SceneState::ImageReady => "image_ready",
            SceneState::ImageFailed => "image_failed",
            SceneState::AudioResolving => "audio_resolving",
            SceneState::AudioReady => "audio_ready",
            SceneState::AudioFailed => "audio_failed",
            SceneState::Done => "done",
        }
    }
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives scene state transitions as a run progresses
pub trait RunObserver: Send + Sync {
    fn on_transition(&self, scene: SceneId, state: SceneState);
}

/// Observer that ignores every transition
pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn on_transition(&self, _scene: SceneId, _state: SceneState) {}
}

/// Observer that logs transitions through `tracing`
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn on_transition(&self, scene: SceneId, state: SceneState) {
        match state {
            SceneState::ImageFailed | SceneState::AudioFailed => {
                tracing::warn!(scene = %scene, state = %state, "scene transition")
            }
            SceneState::Done => tracing::info!(scene = %scene, "scene done"),
            _ => tracing::debug!(scene = %scene, state = %state, "scene transition"),
        }
    }
}

/// Shared flag requesting a run to stop starting new work
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Progress of one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Waiting,
    Resolving,
    Ready,
    Failed,
}

impl Phase {
    fn settled(&self) -> bool {
        matches!(self, Phase::Ready | Phase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Artifact {
    Image,
    Audio,
}

struct SceneProgress {
    image: Phase,
    audio: Phase,
    /// Canonical states already reported
    reported: Vec<SceneState>,
}

impl SceneProgress {
    /// Longest prefix of the canonical state path the phases justify.
    ///
    /// Image and audio run independently, so audio progress is only
    /// reported once the image has settled.
    fn canonical_path(&self) -> Vec<SceneState> {
        let mut path = vec![SceneState::Pending];
        if self.image == Phase::Waiting {
            return path;
        }
        path.push(SceneState::ImageResolving);
        match self.image {
            Phase::Ready => path.push(SceneState::ImageReady),
            Phase::Failed => path.push(SceneState::ImageFailed),
            _ => return path,
        }
        if self.audio == Phase::Waiting {
            return path;
        }
        path.push(SceneState::AudioResolving);
        match self.audio {
            Phase::Ready => path.push(SceneState::AudioReady),
            Phase::Failed => path.push(SceneState::AudioFailed),
            _ => return path,
        }
        path.push(SceneState::Done);
        path
    }
}

/// Per-scene state machines for one run
pub(crate) struct SceneTracker<'a> {
    scenes: HashMap<SceneId, Mutex<SceneProgress>>,
    observer: &'a dyn RunObserver,
}

impl<'a> SceneTracker<'a> {
    pub(crate) fn new(ids: impl IntoIterator<Item = SceneId>, observer: &'a dyn RunObserver) -> Self {
        let scenes = ids
            .into_iter()
            .map(|id| {
                observer.on_transition(id, SceneState::Pending);
                (
                    id,
                    Mutex::new(SceneProgress {
                        image: Phase::Waiting,
                        audio: Phase::Waiting,
                        reported: vec![SceneState::Pending],
                    }),
                )
            })
            .collect();
        Self { scenes, observer }
    }

    /// Record an artifact phase change and report any newly reached states
    pub(crate) fn advance(&self, id: SceneId, artifact: Artifact, phase: Phase) {
        let Some(progress) = self.scenes.get(&id) else {
            return;
        };
        let mut progress = progress.lock().unwrap_or_else(|e| e.into_inner());

        let current = match artifact {
            Artifact::Image => &mut progress.image,
            Artifact::Audio => &mut progress.audio,
        };
        // Phases only move forward
        if current.settled() || (*current == Phase::Resolving && phase == Phase::Waiting) {
            return;
        }
        *current = phase;

        let path = progress.canonical_path();
        for &state in &path[progress.reported.len().min(path.len())..] {
            self.observer.on_transition(id, state);
        }
        if path.len() > progress.reported.len() {
            progress.reported = path;
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self, id: SceneId) -> Option<SceneState> {
        let progress = self.scenes.get(&id)?.lock().unwrap_or_else(|e| e.into_inner());
        progress.reported.last().copied()
    }
}
