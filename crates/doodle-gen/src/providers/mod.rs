//! Provider registry
//!
//! Maps provider names to concrete capability implementations and chains
//! them into ranked fallback lists.

pub mod elevenlabs;
pub mod flux;
mod http;
pub mod placeholder;

use crate::capability::{cancelled, ImageCapability, ImageRequest, SpeechCapability};
use crate::config::DoodleConfig;
use crate::progress::CancellationToken;
use doodle_core::{DoodleError, GenerationConfig, GenerationError, Result};
use std::path::{Path, PathBuf};

/// Create an image provider by name with configuration
pub fn create_image_provider(name: &str, config: &DoodleConfig) -> Result<Box<dyn ImageCapability>> {
    match name {
        "placeholder" => Ok(Box::new(placeholder::PlaceholderImage::new())),
        "flux" => Ok(Box::new(flux::FluxProvider::from_config(config)?)),
        _ => Err(DoodleError::Config(format!(
            "Unknown image provider '{}'. Available: {}",
            name,
            available_image_providers().join(", ")
        ))),
    }
}

/// Create a speech provider by name with configuration
pub fn create_speech_provider(name: &str, config: &DoodleConfig) -> Result<Box<dyn SpeechCapability>> {
    match name {
        "placeholder" => Ok(Box::new(placeholder::PlaceholderSpeech::new())),
        "elevenlabs" => Ok(Box::new(elevenlabs::ElevenLabsProvider::from_config(config)?)),
        _ => Err(DoodleError::Config(format!(
            "Unknown speech provider '{}'. Available: {}",
            name,
            available_speech_providers().join(", ")
        ))),
    }
}

pub fn available_image_providers() -> Vec<&'static str> {
    vec!["placeholder", "flux"]
}

pub fn available_speech_providers() -> Vec<&'static str> {
    vec!["placeholder", "elevenlabs"]
}

/// Build the image chain from `[generation] image_providers`.
///
/// Disabled providers and providers that cannot be constructed (missing
/// API key) are skipped with a warning; unknown names are an error.
pub fn image_chain(config: &DoodleConfig) -> Result<Ranked<dyn ImageCapability>> {
    let mut chain = Ranked::new();
    for name in &config.generation.image_providers {
        if !config.is_enabled(name) {
            tracing::info!(provider = %name, "image provider disabled; skipping");
            continue;
        }
        if !available_image_providers().contains(&name.as_str()) {
            return Err(DoodleError::Config(format!(
                "Unknown image provider '{}'. Available: {}",
                name,
                available_image_providers().join(", ")
            )));
        }
        match create_image_provider(name, config) {
            Ok(provider) => chain.push(provider),
            Err(e) => tracing::warn!(provider = %name, error = %e, "image provider unavailable; skipping"),
        }
    }
    Ok(chain)
}

/// Build the speech chain from `[generation] speech_providers`
pub fn speech_chain(config: &DoodleConfig) -> Result<Ranked<dyn SpeechCapability>> {
    let mut chain = Ranked::new();
    for name in &config.generation.speech_providers {
        if !config.is_enabled(name) {
            tracing::info!(provider = %name, "speech provider disabled; skipping");
            continue;
        }
        if !available_speech_providers().contains(&name.as_str()) {
            return Err(DoodleError::Config(format!(
                "Unknown speech provider '{}'. Available: {}",
                name,
                available_speech_providers().join(", ")
            )));
        }
        match create_speech_provider(name, config) {
            Ok(provider) => chain.push(provider),
            Err(e) => tracing::warn!(provider = %name, error = %e, "speech provider unavailable; skipping"),
        }
    }
    Ok(chain)
}

/// Ordered fallback list behind a single capability.
///
/// Each provider is tried in turn; the first success wins, otherwise the
/// last provider's error is returned. No further provider is tried once
/// the run is cancelled.
pub struct Ranked<T: ?Sized> {
    providers: Vec<Box<T>>,
}

impl<T: ?Sized> Ranked<T> {
    pub fn new() -> Self {
        Self { providers: Vec::new() }
    }

    pub fn push(&mut self, provider: Box<T>) {
        self.providers.push(provider);
    }

    pub fn with(mut self, provider: Box<T>) -> Self {
        self.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl<T: ?Sized> Default for Ranked<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl Ranked<dyn ImageCapability> {
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

impl Ranked<dyn SpeechCapability> {
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

fn first_success<P: ?Sized>(
    providers: &[Box<P>],
    capability: &str,
    cancel: &CancellationToken,
    name: impl Fn(&P) -> &str,
    mut attempt: impl FnMut(&P) -> std::result::Result<PathBuf, GenerationError>,
) -> std::result::Result<PathBuf, GenerationError> {
    let mut last_error = None;
    for (rank, provider) in providers.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::debug!(provider = name(&**provider), rank, "run cancelled; {} chain stopped", capability);
            return Err(last_error.unwrap_or_else(|| cancelled(capability)));
        }
        match attempt(&**provider) {
            Ok(path) => {
                if rank > 0 {
                    tracing::info!(provider = name(&**provider), rank, "{} fallback succeeded", capability);
                }
                return Ok(path);
            }
            Err(e) => {
                tracing::warn!(provider = name(&**provider), error = %e, "{} provider failed", capability);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        GenerationError::model_load(format!("No {} providers configured", capability))
    }))
}

impl ImageCapability for Ranked<dyn ImageCapability> {
    fn name(&self) -> &str {
        "ranked"
    }

    fn generate_image(
        &self,
        request: &ImageRequest<'_>,
        config: &GenerationConfig,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<PathBuf, GenerationError> {
        first_success(&self.providers, "image", cancel, |p| p.name(), |p| {
            p.generate_image(request, config, output_dir, cancel)
        })
    }
}

impl SpeechCapability for Ranked<dyn SpeechCapability> {
    fn name(&self) -> &str {
        "ranked"
    }

    fn synthesize_speech(
        &self,
        text: &str,
        voice: &str,
        config: &GenerationConfig,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<PathBuf, GenerationError> {
        first_success(&self.providers, "speech", cancel, |p| p.name(), |p| {
            p.synthesize_speech(text, voice, config, output_dir, cancel)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doodle_core::{GenerationErrorKind, QualityLevel, Scheduler};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        name: &'static str,
        result: std::result::Result<PathBuf, GenerationError>,
        calls: Arc<AtomicUsize>,
        /// Cancelled from inside the call
        cancels: Option<CancellationToken>,
    }

    impl Scripted {
        fn new(name: &'static str, result: std::result::Result<PathBuf, GenerationError>) -> Self {
            Self {
                name,
                result,
                calls: Arc::new(AtomicUsize::new(0)),
                cancels: None,
            }
        }

        fn counted(mut self, calls: &Arc<AtomicUsize>) -> Self {
            self.calls = Arc::clone(calls);
            self
        }

        fn boxed(self) -> Box<dyn ImageCapability> {
            Box::new(self)
        }
    }

    impl ImageCapability for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn generate_image(
            &self,
            _request: &ImageRequest<'_>,
            _config: &GenerationConfig,
            _output_dir: &Path,
            _cancel: &CancellationToken,
        ) -> std::result::Result<PathBuf, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancels {
                token.cancel();
            }
            self.result.clone()
        }
    }

    fn config() -> GenerationConfig {
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

    fn request() -> ImageRequest<'static> {
        ImageRequest {
            description: "Earth with water droplets",
            reference: None,
        }
    }

    fn generate(chain: &Ranked<dyn ImageCapability>) -> std::result::Result<PathBuf, GenerationError> {
        chain.generate_image(&request(), &config(), Path::new("/tmp"), &CancellationToken::new())
    }

    #[test]
    fn test_falls_back_to_next_provider() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let chain = Ranked::<dyn ImageCapability>::new()
            .with(
                Scripted::new("primary", Err(GenerationError::out_of_memory("CUDA OOM")))
                    .counted(&primary_calls)
                    .boxed(),
            )
            .with(
                Scripted::new("fallback", Ok(PathBuf::from("/tmp/fallback.png")))
                    .counted(&fallback_calls)
                    .boxed(),
            );

        let path = generate(&chain).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/fallback.png"));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.names(), vec!["primary", "fallback"]);
    }

    #[test]
    fn test_first_success_stops_chain() {
        let later_calls = Arc::new(AtomicUsize::new(0));
        let chain = Ranked::<dyn ImageCapability>::new()
            .with(Scripted::new("primary", Ok(PathBuf::from("/tmp/primary.png"))).boxed())
            .with(
                Scripted::new("later", Ok(PathBuf::from("/tmp/later.png")))
                    .counted(&later_calls)
                    .boxed(),
            );

        generate(&chain).unwrap();
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_all_failing_returns_last_error() {
        let chain = Ranked::<dyn ImageCapability>::new()
            .with(Scripted::new("a", Err(GenerationError::out_of_memory("first"))).boxed())
            .with(Scripted::new("b", Err(GenerationError::invalid_input("second"))).boxed());

        let err = generate(&chain).unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::InvalidInput);
        assert_eq!(err.message, "second");
    }

    #[test]
    fn test_empty_chain_is_model_load_failure() {
        let chain = Ranked::<dyn ImageCapability>::new();
        let err = generate(&chain).unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::ModelLoadFailure);
    }

    #[test]
    fn test_cancel_stops_fallback() {
        let cancel = CancellationToken::new();
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let primary = Scripted {
            cancels: Some(cancel.clone()),
            ..Scripted::new("primary", Err(GenerationError::out_of_memory("CUDA OOM")))
        };
        let chain = Ranked::<dyn ImageCapability>::new().with(primary.boxed()).with(
            Scripted::new("fallback", Ok(PathBuf::from("/tmp/fallback.png")))
                .counted(&fallback_calls)
                .boxed(),
        );

        let err = chain
            .generate_image(&request(), &config(), Path::new("/tmp"), &cancel)
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::OutOfMemory);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_chain_tries_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Ranked::<dyn ImageCapability>::new()
            .with(Scripted::new("only", Ok(PathBuf::from("/tmp/x.png"))).counted(&calls).boxed());

        assert!(chain
            .generate_image(&request(), &config(), Path::new("/tmp"), &cancel)
            .is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_chain_skips_providers_without_keys() {
        let mut config = DoodleConfig::default();
        config.generation.image_providers = vec!["flux".into(), "placeholder".into()];
        config.providers.clear();

        let chain = image_chain(&config).unwrap();
        assert_eq!(chain.names(), vec!["placeholder"]);
    }

    #[test]
    fn test_chain_rejects_unknown_provider() {
        let mut config = DoodleConfig::default();
        config.generation.speech_providers = vec!["melotts".into()];
        assert!(matches!(speech_chain(&config), Err(DoodleError::Config(_))));
    }
}
