//! Bounded in-process result cache with single-flight computation.
//!
//! Completed artifacts live in an LRU map. A key whose artifact is being
//! computed has an entry in `in_flight` holding a shared handle to the
//! computation, which runs on its own tokio task. Concurrent callers for the
//! same key await that handle instead of starting another computation, and a
//! caller that gives up waiting does not cancel it.
//!
//! The state mutex is never held across an await point or while the
//! computation runs, so unrelated keys never contend on anything but the
//! short map updates.

use std::{
    collections::HashMap,
    future::Future,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use serde::Serialize;
use tracing::debug;

use crate::{artifact::AudioArtifact, cache_key::CacheKey, error::TtsError};

type ComputeResult = Result<Arc<AudioArtifact>, TtsError>;
type InFlight = Shared<BoxFuture<'static, ComputeResult>>;

/// Counters exposed on the metrics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that joined a computation already in flight.
    pub coalesced: u64,
    pub evictions: u64,
    pub entries: usize,
    pub in_flight: usize,
    pub capacity: usize,
}

struct CacheState {
    // None when capacity is zero
    entries: Option<LruCache<CacheKey, Arc<AudioArtifact>>>,
    in_flight: HashMap<CacheKey, InFlight>,
    hits: u64,
    misses: u64,
    coalesced: u64,
    evictions: u64,
}

impl CacheState {
    fn insert(&mut self, key: CacheKey, artifact: Arc<AudioArtifact>) {
        let Some(entries) = self.entries.as_mut() else {
            return;
        };
        if let Some((evicted, _)) = entries.push(key.clone(), artifact) {
            if evicted != key {
                self.evictions += 1;
                debug!(key = %evicted, "evicted least recently used audio");
            }
        }
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight marker for a key when its computation ends, on
/// every exit path including a panic inside the computation.
struct InFlightGuard {
    state: Arc<Mutex<CacheState>>,
    key: Option<CacheKey>,
}

impl InFlightGuard {
    /// Publish a successful result and clear the marker under one lock, so
    /// no caller can observe neither.
    fn complete(mut self, artifact: Option<&Arc<AudioArtifact>>) {
        if let Some(key) = self.key.take() {
            let mut state = lock(&self.state);
            state.in_flight.remove(&key);
            if let Some(artifact) = artifact {
                state.insert(key, Arc::clone(artifact));
            }
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.state).in_flight.remove(&key);
        }
    }
}

/// `CacheKey -> AudioArtifact` store with least-recently-used eviction.
#[derive(Clone)]
pub struct ResultCache {
    state: Arc<Mutex<CacheState>>,
    capacity: usize,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ResultCache {
    /// An empty cache holding at most `capacity` artifacts. Zero capacity is
    /// allowed: every request computes and nothing is remembered, though
    /// concurrent identical requests still share one computation.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: NonZeroUsize::new(capacity).map(LruCache::new),
                in_flight: HashMap::new(),
                hits: 0,
                misses: 0,
                coalesced: 0,
                evictions: 0,
            })),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blocking lookup. A hit becomes the most recently used entry.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<AudioArtifact>> {
        let mut state = lock(&self.state);
        let hit = state.entries.as_mut()?.get(key).cloned();
        if hit.is_some() {
            state.hits += 1;
        }
        hit
    }

    /// Whether `key` is cached, without touching its recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        lock(&self.state)
            .entries
            .as_ref()
            .is_some_and(|entries| entries.contains(key))
    }

    /// Return the cached artifact for `key`, or compute it exactly once.
    ///
    /// `compute` is only called when no artifact is cached and no computation
    /// for `key` is running; it should just build the future, since it is
    /// invoked while the cache state is locked. The future runs on a spawned
    /// task. Its artifact is cached before any waiter resumes; an error is
    /// delivered to every waiter and nothing is cached, so the next call
    /// computes again.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> ComputeResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AudioArtifact, TtsError>> + Send + 'static,
    {
        let pending = {
            let mut state = lock(&self.state);
            if let Some(hit) = state.entries.as_mut().and_then(|e| e.get(&key)).cloned() {
                state.hits += 1;
                debug!(key = %key, "result cache hit");
                return Ok(hit);
            }
            if let Some(pending) = state.in_flight.get(&key).cloned() {
                state.coalesced += 1;
                debug!(key = %key, "joining in-flight synthesis");
                pending
            } else {
                state.misses += 1;
                debug!(key = %key, "result cache miss");
                let pending = self.spawn_computation(key.clone(), compute());
                state.in_flight.insert(key, pending.clone());
                pending
            }
        };
        pending.await
    }

    // Called with the state locked; the spawned task cannot clear its marker
    // before the caller has registered it.
    fn spawn_computation<Fut>(&self, key: CacheKey, work: Fut) -> InFlight
    where
        Fut: Future<Output = Result<AudioArtifact, TtsError>> + Send + 'static,
    {
        let guard = InFlightGuard {
            state: Arc::clone(&self.state),
            key: Some(key),
        };
        let task = tokio::spawn(async move {
            let result = work.await.map(Arc::new);
            guard.complete(result.as_ref().ok());
            result
        });
        async move {
            task.await.unwrap_or_else(|e| {
                Err(TtsError::SynthesisFailure(format!(
                    "synthesis task did not complete: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }

    pub fn stats(&self) -> CacheStats {
        let state = lock(&self.state);
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            coalesced: state.coalesced,
            evictions: state.evictions,
            entries: state.entries.as_ref().map_or(0, LruCache::len),
            in_flight: state.in_flight.len(),
            capacity: self.capacity,
        }
    }
}
