//! On-disk artifact store

use crate::flight::Flight;
use crate::key::{ArtifactKind, CacheKey};
use chrono::{DateTime, Utc};
use doodle_core::{DoodleError, Result, SceneId};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Suffix of in-progress files; never indexed and swept on open
const PARTIAL_SUFFIX: &str = ".partial";

/// A cached artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub path: PathBuf,
    /// Scene the artifact was first produced for (part of the file name)
    pub scene_id: SceneId,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Aggregate size of the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Content-addressed artifact cache.
///
/// Stores files at `<root>/<images|audio>/<scene-id>_<hash>.<ext>`.
/// Safe to share between threads; lookups validate against the disk so
/// entries whose files were deleted or truncated are dropped on sight.
pub struct ContentCache {
    root: PathBuf,
    index: RwLock<HashMap<CacheKey, CacheEntry>>,
    pub(crate) in_flight: Mutex<HashMap<CacheKey, Arc<Flight>>>,
}

impl ContentCache {
    /// Open (or create) a cache rooted at `root`, indexing existing files
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut index = HashMap::new();

        for kind in ArtifactKind::ALL {
            let dir = root.join(kind.dir_name());
            fs::create_dir_all(&dir).map_err(|e| {
                DoodleError::CacheIo(format!("Cannot create {}: {}", dir.display(), e))
            })?;
            scan_kind_dir(kind, &dir, &mut index)?;
        }

        tracing::debug!(root = %root.display(), entries = index.len(), "opened content cache");

        Ok(Self {
            root,
            index: RwLock::new(index),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding artifacts of one kind
    pub fn kind_dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Find a usable entry for `key`.
    ///
    /// An entry is usable when its file exists and is non-empty. Anything
    /// else is treated as a miss and the stale entry (and any truncated
    /// file) is removed.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let indexed = self.read_index().get(key).cloned();
        let candidate = match indexed {
            Some(entry) => Some(entry),
            // Another process may have produced it since we opened
            None => self.find_on_disk(key),
        };
        let entry = candidate?;

        match fs::metadata(&entry.path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                let entry = CacheEntry {
                    size_bytes: meta.len(),
                    ..entry
                };
                self.write_index().insert(*key, entry.clone());
                Some(entry)
            }
            Ok(_) => {
                tracing::warn!(key = %key, path = %entry.path.display(), "cached artifact is empty; discarding");
                if let Err(e) = fs::remove_file(&entry.path) {
                    tracing::warn!(path = %entry.path.display(), error = %e, "could not remove empty artifact");
                }
                self.forget(key, &entry.path);
                None
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(key = %key, path = %entry.path.display(), "cached artifact missing; treating as miss");
                self.forget(key, &entry.path);
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, path = %entry.path.display(), error = %e, "cached artifact unreadable; treating as miss");
                self.forget(key, &entry.path);
                None
            }
        }
    }

    /// Take ownership of a freshly produced artifact and record it.
    ///
    /// The file is moved (or copied, across filesystems) into cache storage
    /// through a temporary name, so readers never observe a partial file.
    /// Storing an existing key again replaces the previous artifact.
    pub fn store(&self, key: &CacheKey, scene_id: SceneId, produced: &Path) -> Result<CacheEntry> {
        let meta = fs::metadata(produced).map_err(|e| {
            DoodleError::CacheIo(format!("Produced artifact {} unreadable: {}", produced.display(), e))
        })?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(DoodleError::CacheIo(format!(
                "Produced artifact {} is empty",
                produced.display()
            )));
        }

        let dir = self.kind_dir(key.kind);
        fs::create_dir_all(&dir)
            .map_err(|e| DoodleError::CacheIo(format!("Cannot create {}: {}", dir.display(), e)))?;

        let ext = produced
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_else(|| key.kind.default_extension());
        let dest = dir.join(format!("{}.{}", key.file_stem(scene_id), ext));
        let staging = dir.join(format!(".{}{}", uuid::Uuid::new_v4(), PARTIAL_SUFFIX));

        if fs::rename(produced, &staging).is_err() {
            fs::copy(produced, &staging).map_err(|e| {
                DoodleError::CacheIo(format!("Cannot copy {} into cache: {}", produced.display(), e))
            })?;
            if let Err(e) = fs::remove_file(produced) {
                tracing::debug!(path = %produced.display(), error = %e, "could not remove produced artifact after copy");
            }
        }

        let mut index = self.write_index();
        if let Err(e) = fs::rename(&staging, &dest) {
            fs::remove_file(&staging).ok();
            return Err(DoodleError::CacheIo(format!(
                "Cannot place artifact at {}: {}",
                dest.display(),
                e
            )));
        }

        let entry = CacheEntry {
            key: *key,
            path: dest,
            scene_id,
            created_at: Utc::now(),
            size_bytes: meta.len(),
        };

        if let Some(previous) = index.insert(*key, entry.clone()) {
            if previous.path != entry.path {
                if let Err(e) = fs::remove_file(&previous.path) {
                    if e.kind() != ErrorKind::NotFound {
                        tracing::warn!(path = %previous.path.display(), error = %e, "could not discard replaced artifact");
                    }
                }
            }
        }

        tracing::debug!(key = %key, path = %entry.path.display(), "stored artifact");
        Ok(entry)
    }

    /// Remove every entry, or only those of one kind. Returns files removed.
    pub fn clear(&self, kind: Option<ArtifactKind>) -> Result<usize> {
        let kinds: Vec<ArtifactKind> = match kind {
            Some(k) => vec![k],
            None => ArtifactKind::ALL.to_vec(),
        };

        let mut index = self.write_index();
        let mut removed = 0;

        for kind in kinds {
            index.retain(|k, _| k.kind != kind);

            let dir = self.kind_dir(kind);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(DoodleError::CacheIo(format!(
                        "Cannot read {}: {}",
                        dir.display(),
                        e
                    )))
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    fs::remove_file(&path).map_err(|e| {
                        DoodleError::CacheIo(format!("Cannot remove {}: {}", path.display(), e))
                    })?;
                    removed += 1;
                }
            }
        }

        tracing::info!(removed, scope = ?kind, "cleared cache");
        Ok(removed)
    }

    /// Indexed entries, optionally of one kind, ordered by scene then path
    pub fn entries(&self, kind: Option<ArtifactKind>) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .read_index()
            .values()
            .filter(|e| kind.map_or(true, |k| e.key.kind == k))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.scene_id.cmp(&b.scene_id).then_with(|| a.path.cmp(&b.path)));
        entries
    }

    /// Entry count and total size, optionally of one kind
    pub fn stats(&self, kind: Option<ArtifactKind>) -> CacheStats {
        self.read_index()
            .values()
            .filter(|e| kind.map_or(true, |k| e.key.kind == k))
            .fold(CacheStats::default(), |acc, e| CacheStats {
                entries: acc.entries + 1,
                total_bytes: acc.total_bytes + e.size_bytes,
            })
    }

    fn find_on_disk(&self, key: &CacheKey) -> Option<CacheEntry> {
        let suffix = format!("_{}.", key.hash.to_hex());
        let dir = self.kind_dir(key.kind);
        fs::read_dir(&dir)
            .ok()?
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.contains(&suffix) {
                    return None;
                }
                entry_from_file(key.kind, &entry.path(), &name)
            })
            .max_by_key(|e| e.created_at)
    }

    /// Drop `key` from the index if it still points at `path`
    fn forget(&self, key: &CacheKey, path: &Path) {
        let mut index = self.write_index();
        if index.get(key).is_some_and(|e| e.path == path) {
            index.remove(key);
        }
    }

    fn read_index(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn scan_kind_dir(
    kind: ArtifactKind,
    dir: &Path,
    index: &mut HashMap<CacheKey, CacheEntry>,
) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| DoodleError::CacheIo(format!("Cannot read {}: {}", dir.display(), e)))?;

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if name.ends_with(PARTIAL_SUFFIX) {
            tracing::debug!(path = %path.display(), "sweeping abandoned partial artifact");
            fs::remove_file(&path).ok();
            continue;
        }

        let Some(found) = entry_from_file(kind, &path, &name) else {
            continue;
        };

        // Two files for one key: the newest wins, the other is discarded
        match index.get(&found.key) {
            Some(existing) if existing.created_at >= found.created_at => {
                fs::remove_file(&found.path).ok();
            }
            _ => {
                if let Some(replaced) = index.insert(found.key, found) {
                    fs::remove_file(&replaced.path).ok();
                }
            }
        }
    }

    Ok(())
}

fn entry_from_file(kind: ArtifactKind, path: &Path, name: &str) -> Option<CacheEntry> {
    let (key, scene_id) = CacheKey::parse_file_name(kind, name)?;
    let meta = fs::metadata(path).ok().filter(|m| m.is_file())?;
    let created_at = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Some(CacheEntry {
        key,
        path: path.to_path_buf(),
        scene_id,
        created_at,
        size_bytes: meta.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{compute_key, SemanticInput};
    use doodle_core::{GenerationConfig, QualityLevel, Scheduler};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("doodle_cache_test_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config() -> GenerationConfig {
        GenerationConfig {
            quality: QualityLevel::Balanced,
            steps: 20,
            resolution: 512,
            quantize: true,
            guidance_scale: 7.5,
            scheduler: Scheduler::UniPc,
            sample_rate: 22050,
        }
    }

    fn image_key(prompt: &str) -> CacheKey {
        compute_key(ArtifactKind::Image, &SemanticInput::image(prompt, None), &config())
    }

    fn produce(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_store_and_lookup() {
        let dir = temp_dir();
        let cache = ContentCache::open(dir.join("cache")).unwrap();
        let key = image_key("Earth with water droplets");

        assert!(cache.lookup(&key).is_none());

        let produced = produce(&dir, "out.png", b"png bytes");
        let entry = cache.store(&key, SceneId(1), &produced).unwrap();

        assert!(!produced.exists(), "store takes ownership of the produced file");
        assert_eq!(
            entry.path.file_name().unwrap().to_string_lossy(),
            format!("1_{}.png", key.hash.to_hex())
        );
        assert!(entry.path.starts_with(dir.join("cache").join("images")));

        let found = cache.lookup(&key).unwrap();
        assert_eq!(found.path, entry.path);
        assert_eq!(fs::read(&found.path).unwrap(), b"png bytes");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_store_twice_same_key_keeps_one_readable_entry() {
        let dir = temp_dir();
        let cache = ContentCache::open(dir.join("cache")).unwrap();
        let key = image_key("bathroom sink with faucet");

        let first = cache.store(&key, SceneId(1), &produce(&dir, "a.png", b"first")).unwrap();
        let second = cache.store(&key, SceneId(2), &produce(&dir, "b.png", b"second")).unwrap();

        assert!(!first.path.exists(), "replaced artifact is discarded");
        assert_eq!(cache.stats(Some(ArtifactKind::Image)).entries, 1);

        let found = cache.lookup(&key).unwrap();
        assert_eq!(found.path, second.path);
        assert_eq!(fs::read(&found.path).unwrap(), b"second");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_lookup_self_heals_after_external_delete() {
        let dir = temp_dir();
        let cache = ContentCache::open(dir.join("cache")).unwrap();
        let key = image_key("a lighthouse");

        let entry = cache.store(&key, SceneId(3), &produce(&dir, "x.png", b"pixels")).unwrap();
        fs::remove_file(&entry.path).unwrap();

        assert!(cache.lookup(&key).is_none());
        assert_eq!(cache.stats(None).entries, 0);

        let again = cache.store(&key, SceneId(3), &produce(&dir, "y.png", b"pixels again")).unwrap();
        assert_eq!(cache.lookup(&key).unwrap().path, again.path);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_lookup_discards_truncated_file() {
        let dir = temp_dir();
        let cache = ContentCache::open(dir.join("cache")).unwrap();
        let key = image_key("a windmill");

        let entry = cache.store(&key, SceneId(1), &produce(&dir, "w.png", b"data")).unwrap();
        fs::write(&entry.path, b"").unwrap();

        assert!(cache.lookup(&key).is_none());
        assert!(!entry.path.exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_store_rejects_empty_artifact() {
        let dir = temp_dir();
        let cache = ContentCache::open(dir.join("cache")).unwrap();
        let key = image_key("nothing");

        let result = cache.store(&key, SceneId(1), &produce(&dir, "empty.png", b""));
        assert!(matches!(result, Err(DoodleError::CacheIo(_))));
        assert!(cache.lookup(&key).is_none());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_reopen_rebuilds_index_from_layout() {
        let dir = temp_dir();
        let root = dir.join("cache");
        let key = image_key("a globe");
        {
            let cache = ContentCache::open(&root).unwrap();
            cache.store(&key, SceneId(4), &produce(&dir, "g.png", b"globe")).unwrap();
        }
        fs::write(root.join("images").join(".stale.partial"), b"junk").unwrap();

        let reopened = ContentCache::open(&root).unwrap();
        let entry = reopened.lookup(&key).unwrap();
        assert_eq!(entry.scene_id, SceneId(4));
        assert!(!root.join("images").join(".stale.partial").exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_lookup_finds_file_written_by_another_process() {
        let dir = temp_dir();
        let root = dir.join("cache");
        let cache = ContentCache::open(&root).unwrap();
        let key = image_key("a kettle");

        let name = format!("{}.png", key.file_stem(SceneId(9)));
        fs::write(root.join("images").join(name), b"kettle").unwrap();

        assert_eq!(cache.lookup(&key).unwrap().scene_id, SceneId(9));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_clear_scoped_by_kind() {
        let dir = temp_dir();
        let cache = ContentCache::open(dir.join("cache")).unwrap();

        let image = image_key("tree");
        let audio = compute_key(ArtifactKind::Audio, &SemanticInput::speech("trees", "neutral"), &config());
        cache.store(&image, SceneId(1), &produce(&dir, "t.png", b"tree")).unwrap();
        cache.store(&audio, SceneId(1), &produce(&dir, "t.wav", b"RIFF")).unwrap();

        assert_eq!(cache.clear(Some(ArtifactKind::Audio)).unwrap(), 1);
        assert!(cache.lookup(&audio).is_none());
        assert!(cache.lookup(&image).is_some());

        assert_eq!(cache.clear(None).unwrap(), 1);
        assert_eq!(cache.stats(None), CacheStats::default());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_concurrent_stores_for_different_keys() {
        let dir = temp_dir();
        let cache = ContentCache::open(dir.join("cache")).unwrap();

        std::thread::scope(|s| {
            for i in 0..16u32 {
                let (cache, dir) = (&cache, &dir);
                s.spawn(move || {
                    let key = image_key(&format!("scene {}", i));
                    let produced = produce(dir, &format!("p{}.png", i), format!("img {}", i).as_bytes());
                    cache.store(&key, SceneId(i + 1), &produced).unwrap();
                });
            }
        });

        let stats = cache.stats(Some(ArtifactKind::Image));
        assert_eq!(stats.entries, 16);
        assert!(cache.entries(None).iter().all(|e| e.path.exists()));

        fs::remove_dir_all(&dir).ok();
    }
}
