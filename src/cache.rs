use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::notify::NotificationBus;
use crate::transport::ApiError;

/// Resource path plus a canonical (order-independent) encoding of the query
/// parameters, so that any filter change is observed as a distinct key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub path: Arc<str>,
    pub params_canonical: Arc<str>,
}

impl QueryKey {
    pub fn new(path: &str, params: &[(String, String)]) -> Self {
        let mut obj = serde_json::Map::new();
        for (name, value) in params {
            obj.insert(name.clone(), Value::String(value.clone()));
        }
        let args = Value::Object(obj);
        let canonical = serde_jcs::to_string(&args)
            .or_else(|_| serde_json::to_string(&args))
            .unwrap_or_else(|_| "{}".to_string());
        Self {
            path: Arc::from(path),
            params_canonical: Arc::from(canonical.as_str()),
        }
    }

    pub fn bare(path: &str) -> Self {
        Self::new(path, &[])
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Type-erased read operation. Cloned for retries and background refreshes.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync>;

pub fn fetcher<F, Fut>(f: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, ApiError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

type SharedFetch = Shared<BoxFuture<'static, Result<Value, Arc<ApiError>>>>;

/// Key-addressed cache of server responses with a time-to-live, coalescing
/// of concurrent fetches per key, prefix invalidation, and bounded retries
/// for idempotent reads. Mutations pass through untouched and never retry.
#[derive(Clone)]
pub struct QueryCache {
    primary: Arc<DashMap<QueryKey, Arc<RwLock<CacheEntry>>>>,
    path_index: Arc<DashMap<Arc<str>, DashSet<QueryKey>>>,
    in_flight: Arc<DashMap<QueryKey, SharedFetch>>,
    // bumped on every invalidation so a fetch that raced one cannot write
    // a pre-mutation payload back into the cache
    generation: Arc<AtomicU64>,
    bus: NotificationBus,
    read_retries: u32,
}

impl QueryCache {
    pub fn new(bus: NotificationBus, read_retries: u32) -> Self {
        Self {
            primary: Arc::new(DashMap::new()),
            path_index: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            bus,
            read_retries,
        }
    }

    /// Serve fresh entries immediately; serve stale entries immediately while
    /// refreshing in the background; fetch on a miss, coalescing with any
    /// in-flight fetch for the same key.
    pub async fn query(
        &self,
        key: QueryKey,
        ttl: Duration,
        fetch: Fetcher,
    ) -> Result<Value, ApiError> {
        if let Some(entry) = self.get(&key).await {
            if entry.is_fresh(ttl) {
                debug!(path = %key.path, "cache hit");
                return Ok(entry.value);
            }

            debug!(path = %key.path, "serving stale value, refreshing in background");
            let cache = self.clone();
            let bg_key = key.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.fetch_coalesced(&bg_key, fetch).await {
                    warn!(path = %bg_key.path, error = %e, "background refresh failed");
                }
            });
            return Ok(entry.value);
        }

        self.fetch_coalesced(&key, fetch).await
    }

    /// Execute a write operation. Never retried; affected read keys must be
    /// invalidated explicitly by the caller on success.
    pub async fn mutate<Fut>(&self, op: Fut) -> Result<Value, ApiError>
    where
        Fut: std::future::Future<Output = Result<Value, ApiError>>,
    {
        match op.await {
            Ok(value) => Ok(value),
            Err(e) => {
                // status failures were already surfaced by the transport
                if e.status().is_none() {
                    self.bus.error(e.friendly_message());
                }
                Err(e)
            }
        }
    }

    /// Evict every entry whose path equals the prefix or extends it by a
    /// full segment, forcing the next query for those keys to refetch.
    pub fn invalidate(&self, prefix: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let paths: Vec<Arc<str>> = self
            .path_index
            .iter()
            .filter(|entry| Self::covered_by(entry.key(), prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0usize;
        for path in paths {
            if let Some((_, keys)) = self.path_index.remove(&path) {
                for key in keys.iter() {
                    self.primary.remove(&*key);
                    self.in_flight.remove(&*key);
                    evicted += 1;
                }
            }
        }
        debug!(prefix, evicted, "cache invalidated");
    }

    /// Evict only the entries (all parameter variants) of one exact path,
    /// leaving sibling and nested paths untouched.
    pub fn invalidate_exact(&self, path: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some((_, keys)) = self.path_index.remove(path) {
            for key in keys.iter() {
                self.primary.remove(&*key);
                self.in_flight.remove(&*key);
            }
        }
        debug!(path, "cache entry invalidated");
    }

    /// Drop everything, including in-flight fetch registrations.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.primary.clear();
        self.path_index.clear();
        self.in_flight.clear();
    }

    // Segment-aware: "/catalog/listings/5" covers ".../5/images" but
    // not ".../55".
    fn covered_by(path: &str, prefix: &str) -> bool {
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    async fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        let entry = self.primary.get(key)?;
        let guard = entry.value().read().await;
        Some(guard.clone())
    }

    async fn put(&self, key: QueryKey, value: Value) {
        let entry = CacheEntry {
            value,
            fetched_at: Instant::now(),
        };
        match self.primary.get(&key) {
            Some(existing) => {
                let mut guard = existing.value().write().await;
                *guard = entry;
            }
            None => {
                self.primary
                    .insert(key.clone(), Arc::new(RwLock::new(entry)));
                self.path_index
                    .entry(key.path.clone())
                    .or_default()
                    .insert(key);
            }
        }
    }

    /// At most one fetch per key is in flight: later callers await the first
    /// fetch's shared future and see the same value or the same failure.
    async fn fetch_coalesced(&self, key: &QueryKey, fetch: Fetcher) -> Result<Value, ApiError> {
        let shared = {
            match self.in_flight.entry(key.clone()) {
                dashmap::mapref::entry::Entry::Occupied(occupied) => occupied.get().clone(),
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    let cache = self.clone();
                    let fetch_key = key.clone();
                    let observed_generation = self.generation.load(Ordering::SeqCst);
                    let fut: BoxFuture<'static, Result<Value, Arc<ApiError>>> =
                        async move {
                            match cache.fetch_with_retries(&fetch).await {
                                Ok(value) => {
                                    // skip the write if an invalidation raced us
                                    if cache.generation.load(Ordering::SeqCst)
                                        == observed_generation
                                    {
                                        cache.put(fetch_key, value.clone()).await;
                                    }
                                    Ok(value)
                                }
                                Err(e) => Err(Arc::new(e)),
                            }
                        }
                        .boxed();
                    let shared = fut.shared();
                    vacant.insert(shared.clone());
                    shared
                }
            }
        };

        let result = shared.await;
        self.in_flight.remove_if(key, |_, f| f.peek().is_some());

        result.map_err(|shared_err| match Arc::try_unwrap(shared_err) {
            Ok(e) => e,
            Err(arc) => ApiError::Coalesced(arc),
        })
    }

    async fn fetch_with_retries(&self, fetch: &Fetcher) -> Result<Value, ApiError> {
        let mut attempt = 0u32;
        loop {
            match fetch().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.read_retries => {
                    attempt += 1;
                    debug!(attempt, error = %e, "transient fetch failure, retrying");
                }
                Err(e) => {
                    if e.status().is_none() {
                        self.bus.error(e.friendly_message());
                    }
                    return Err(e);
                }
            }
        }
    }
}
