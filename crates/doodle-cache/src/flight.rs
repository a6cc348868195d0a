//! Single-flight resolution of cache keys

use crate::key::CacheKey;
use crate::store::ContentCache;
use doodle_core::{ArtifactFailure, SceneId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};

/// Where a resolved artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactSource {
    /// Produced by this request
    Generated,
    /// Found in the cache
    Cached,
    /// Produced by a concurrent request for the same key
    Shared,
}

impl ArtifactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactSource::Generated => "generated",
            ArtifactSource::Cached => "cached",
            ArtifactSource::Shared => "shared",
        }
    }
}

/// A resolved artifact path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub path: PathBuf,
    pub source: ArtifactSource,
}

impl Resolution {
    /// True when no production work was done for this request
    pub fn cache_hit(&self) -> bool {
        self.source != ArtifactSource::Generated
    }
}

type FlightOutcome = Result<PathBuf, ArtifactFailure>;

/// One in-progress production that followers can wait on
pub(crate) struct Flight {
    outcome: Mutex<Option<FlightOutcome>>,
    done: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, outcome: FlightOutcome) {
        let mut slot = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> FlightOutcome {
        let mut slot = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Completes and unregisters a flight even if the leader unwinds
struct LeaderGuard<'a> {
    cache: &'a ContentCache,
    key: CacheKey,
    flight: Arc<Flight>,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.flight.complete(Err(ArtifactFailure::Interrupted {
            message: format!("production of {} stopped before finishing", self.key),
        }));
        let mut flights = self.cache.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if flights.get(&self.key).is_some_and(|f| Arc::ptr_eq(f, &self.flight)) {
            flights.remove(&self.key);
        }
    }
}

enum Role {
    Leader(Arc<Flight>),
    Follower(Arc<Flight>),
}

impl ContentCache {
    /// Resolve `key`, producing the artifact at most once per key at a time.
    ///
    /// With `use_cached`, a valid cache entry is returned without calling
    /// `produce`. Otherwise (or on a miss) the first caller for the key runs
    /// `produce` and stores the result; callers arriving while it runs wait
    /// and receive the same path or the same failure, even when they would
    /// otherwise have read the cache. A produced artifact that cannot be
    /// stored is still returned, uncached.
    pub fn get_or_produce<F>(
        &self,
        key: &CacheKey,
        scene_id: SceneId,
        use_cached: bool,
        produce: F,
    ) -> Result<Resolution, ArtifactFailure>
    where
        F: FnOnce() -> Result<PathBuf, ArtifactFailure>,
    {
        self.get_or_produce_with(key, scene_id, || use_cached, produce)
    }

    /// Like [`get_or_produce`](Self::get_or_produce), but asks `use_cached`
    /// each time the cache is consulted: once before joining the key's
    /// flight and again after winning it. A caller can therefore start
    /// trusting the cache for a key part way through a run.
    pub fn get_or_produce_with<C, F>(
        &self,
        key: &CacheKey,
        scene_id: SceneId,
        use_cached: C,
        produce: F,
    ) -> Result<Resolution, ArtifactFailure>
    where
        C: Fn() -> bool,
        F: FnOnce() -> Result<PathBuf, ArtifactFailure>,
    {
        // A key being produced right now is about to replace whatever is cached
        let busy = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key);
        if !busy && use_cached() {
            if let Some(entry) = self.lookup(key) {
                tracing::debug!(key = %key, scene = %scene_id, "cache hit");
                return Ok(Resolution {
                    path: entry.path,
                    source: ArtifactSource::Cached,
                });
            }
        }

        let role = {
            let mut flights = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match flights.get(key) {
                Some(flight) => Role::Follower(Arc::clone(flight)),
                None => {
                    let flight = Arc::new(Flight::new());
                    flights.insert(*key, Arc::clone(&flight));
                    Role::Leader(flight)
                }
            }
        };

        let flight = match role {
            Role::Follower(flight) => {
                tracing::debug!(key = %key, scene = %scene_id, "waiting on in-flight production");
                let path = flight.wait()?;
                return Ok(Resolution {
                    path,
                    source: ArtifactSource::Shared,
                });
            }
            Role::Leader(flight) => flight,
        };

        let guard = LeaderGuard {
            cache: self,
            key: *key,
            flight,
        };

        // A previous leader may have finished between our lookup and registering
        if use_cached() {
            if let Some(entry) = self.lookup(key) {
                guard.flight.complete(Ok(entry.path.clone()));
                return Ok(Resolution {
                    path: entry.path,
                    source: ArtifactSource::Cached,
                });
            }
        }

        let outcome = produce().map(|produced| match self.store(key, scene_id, &produced) {
            Ok(entry) => entry.path,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "could not cache artifact; using it uncached");
                produced
            }
        });

        guard.flight.complete(outcome.clone());
        drop(guard);

        outcome.map(|path| Resolution {
            path,
            source: ArtifactSource::Generated,
        })
    }
}
