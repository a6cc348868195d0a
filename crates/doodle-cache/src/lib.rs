//! Doodle Cache - Content-addressed artifact cache
//!
//! Maps deterministic keys (artifact kind + semantic input + generation
//! config) to generated files stored at
//! `<root>/<images|audio>/<scene-id>_<hash>.<ext>`. The file layout is the
//! only persistence; the in-memory index is rebuilt from it on open.

mod flight;
mod key;
mod store;

pub use flight::{ArtifactSource, Resolution};
pub use key::{compute_key, reference_identity, ArtifactKind, CacheKey, SemanticInput};
pub use store::{CacheEntry, CacheStats, ContentCache};
