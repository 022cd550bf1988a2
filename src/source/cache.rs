//! Bounded cache of opened sources.
//!
//! Opening a source can mean parsing remote headers or decoding a whole
//! file, so opened sources are kept in a bounded LRU cache keyed by
//! (path, type hint, open params). A singleflight map ensures concurrent
//! requests for the same source perform one underlying open; the cache is
//! the only shared mutable state in the engine and is safe to use from any
//! number of concurrent tile requests.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::debug;

use crate::error::OpenError;
use crate::source::provider::TileSource;
use crate::source::registry::OpenerRegistry;

/// Default number of opened sources to keep.
pub const DEFAULT_SOURCE_CACHE_CAPACITY: usize = 100;

// =============================================================================
// Cache key
// =============================================================================

/// Identity of an opened source.
///
/// Two entries naming the same file with different open params are distinct
/// sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub path: PathBuf,
    pub type_hint: Option<String>,
    /// Canonical JSON serialization of the open params, empty when absent.
    pub params: String,
}

impl SourceKey {
    pub fn new(path: &Path, type_hint: Option<&str>, params: Option<&serde_json::Value>) -> Self {
        Self {
            path: path.to_path_buf(),
            type_hint: type_hint.map(str::to_string),
            params: params.map(|p| p.to_string()).unwrap_or_default(),
        }
    }
}

// =============================================================================
// SourceCache
// =============================================================================

/// State for an in-flight open.
struct InFlightState {
    notify: Notify,
    result: Mutex<Option<Result<Arc<dyn TileSource>, OpenError>>>,
}

/// Bounded, thread-safe cache of opened sources with LRU eviction.
pub struct SourceCache {
    registry: Arc<OpenerRegistry>,
    cache: RwLock<LruCache<SourceKey, Arc<dyn TileSource>>>,
    in_flight: Mutex<HashMap<SourceKey, Arc<InFlightState>>>,
}

impl SourceCache {
    /// Create a cache with the default capacity.
    pub fn new(registry: Arc<OpenerRegistry>) -> Self {
        Self::with_capacity(registry, DEFAULT_SOURCE_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` opened sources.
    pub fn with_capacity(registry: Arc<OpenerRegistry>, capacity: usize) -> Self {
        Self {
            registry,
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// The opener registry this cache opens through.
    pub fn registry(&self) -> &Arc<OpenerRegistry> {
        &self.registry
    }

    /// Get a source, opening it if not already cached.
    ///
    /// Concurrent calls for the same key wait for a single leader open
    /// instead of duplicating work.
    pub async fn get(
        &self,
        path: &Path,
        type_hint: Option<&str>,
        params: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn TileSource>, OpenError> {
        let key = SourceKey::new(path, type_hint, params);

        // Fast path: already cached.
        {
            let mut cache = self.cache.write().await;
            if let Some(source) = cache.get(&key) {
                return Ok(source.clone());
            }
        }

        // Slow path: join an in-flight open or become the leader.
        loop {
            let state = {
                let mut in_flight = self.in_flight.lock().await;

                if let Some(state) = in_flight.get(&key) {
                    state.clone()
                } else {
                    let state = Arc::new(InFlightState {
                        notify: Notify::new(),
                        result: Mutex::new(None),
                    });
                    in_flight.insert(key.clone(), state.clone());
                    drop(in_flight);

                    debug!(path = %key.path.display(), "opening source");
                    let result = self.registry.open(path, type_hint, params).await;

                    {
                        let mut result_guard = state.result.lock().await;
                        *result_guard = Some(result.clone());
                    }

                    if let Ok(ref source) = result {
                        let mut cache = self.cache.write().await;
                        cache.put(key.clone(), source.clone());
                    }

                    {
                        let mut in_flight = self.in_flight.lock().await;
                        in_flight.remove(&key);
                    }
                    state.notify.notify_waiters();

                    return result;
                }
            };

            state.notify.notified().await;

            let result_guard = state.result.lock().await;
            if let Some(ref result) = *result_guard {
                return result.clone();
            }
            // Leader hadn't stored a result yet; re-check from the top.
        }
    }

    /// Drop one cached source.
    pub async fn invalidate(&self, path: &Path, type_hint: Option<&str>) {
        let key = SourceKey::new(path, type_hint, None);
        let mut cache = self.cache.write().await;
        cache.pop(&key);
    }

    /// Drop every cached source.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    /// Number of currently cached sources.
    pub async fn cached_count(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
