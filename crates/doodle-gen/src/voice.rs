//! Narration voice catalog

use doodle_core::GenerationError;
use serde::Serialize;

/// A narration voice known to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Voice {
    pub id: &'static str,
    /// Language code the voice speaks
    pub language: &'static str,
    pub description: &'static str,
}

pub const VOICES: &[Voice] = &[
    Voice { id: "female_us", language: "en", description: "US English, female" },
    Voice { id: "male_us", language: "en", description: "US English, male" },
    Voice { id: "female_uk", language: "en", description: "British English, female" },
    Voice { id: "male_uk", language: "en", description: "British English, male" },
    Voice { id: "neutral", language: "en", description: "US English, neutral" },
    Voice { id: "female_latam", language: "es_latam", description: "Latin American Spanish, female" },
    Voice { id: "male_latam", language: "es_latam", description: "Latin American Spanish, male" },
    Voice { id: "female_es", language: "es", description: "Castilian Spanish, female" },
    Voice { id: "male_es", language: "es", description: "Castilian Spanish, male" },
];

/// Look up a voice by id
pub fn find(id: &str) -> Option<&'static Voice> {
    VOICES.iter().find(|v| v.id == id)
}

/// Look up a voice, failing the way speech capabilities report it
pub fn require(id: &str) -> Result<&'static Voice, GenerationError> {
    find(id).ok_or_else(|| {
        GenerationError::unsupported_language(format!(
            "Unknown voice '{}'. Available: {}",
            id,
            VOICES.iter().map(|v| v.id).collect::<Vec<_>>().join(", ")
        ))
    })
}

/// Voices speaking `language`
pub fn for_language(language: &str) -> impl Iterator<Item = &'static Voice> + '_ {
    VOICES.iter().filter(move |v| v.language == language)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doodle_core::GenerationErrorKind;

    #[test]
    fn test_default_voice_is_known() {
        assert_eq!(find(doodle_core::script::DEFAULT_VOICE).unwrap().language, "en");
    }

    #[test]
    fn test_unknown_voice_is_unsupported_language() {
        let err = require("klingon_male").unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::UnsupportedLanguage);
        assert!(err.message.contains("female_us"));
    }

    #[test]
    fn test_every_supported_language_has_voices() {
        for language in doodle_core::script::SUPPORTED_LANGUAGES {
            assert!(for_language(language).count() >= 2, "{} has voices", language);
        }
    }
}
