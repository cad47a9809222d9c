//! Fetch-cache-fallback engine.
//!
//! One slot per resource key. A fresh slot is served without touching the
//! upstream; an expired or empty slot triggers a refresh that walks the
//! resource's ordered attempts. When every attempt fails the last good entry
//! is served as stale, and only when there is none does the caller see
//! [`FetchError::NoDataAvailable`].
//!
//! Concurrent refreshes of one key are coalesced: the first caller spawns the
//! refresh and publishes a shared handle, later callers await that handle.

pub mod entry;
pub mod error;
pub mod validate;

pub use entry::{CacheEntry, CacheResponse, Provenance, SlotStatus};
pub use error::{BuildError, FetchError, UpstreamError};
pub use validate::{PlausibilityRule, Validator};

use futures::future::{BoxFuture, FutureExt, Shared};
use moka::future::Cache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::upstream::Attempt;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type SharedRefresh = Shared<BoxFuture<'static, Result<CacheResponse, FetchError>>>;

/// Policy for one tracked resource.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub key: String,
    pub ttl: Duration,
    pub timeout: Duration,
    pub attempts: Vec<Attempt>,
    pub validator: Validator,
}

impl ResourceConfig {
    pub fn new(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            ttl,
            timeout: DEFAULT_TIMEOUT,
            attempts: Vec::new(),
            validator: Validator::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn attempt(mut self, attempt: Attempt) -> Self {
        self.attempts.push(attempt);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }
}

#[derive(Default)]
pub struct FetchCacheBuilder {
    resources: Vec<ResourceConfig>,
}

impl FetchCacheBuilder {
    pub fn resource(mut self, resource: ResourceConfig) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn build(self) -> Result<FetchCache, BuildError> {
        let mut resources = HashMap::with_capacity(self.resources.len());

        for resource in self.resources {
            if resource.attempts.is_empty() {
                return Err(BuildError::NoUpstream(resource.key));
            }
            if resources.contains_key(&resource.key) {
                return Err(BuildError::DuplicateResource(resource.key));
            }
            resources.insert(resource.key.clone(), Arc::new(resource));
        }

        // No TTL or capacity: freshness is decided here, never by eviction.
        let slots = Cache::builder()
            .name("display-slots")
            .initial_capacity(resources.len())
            .build();

        Ok(FetchCache {
            inner: Arc::new(Inner {
                resources,
                slots,
                in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }
}

struct Inner {
    resources: HashMap<String, Arc<ResourceConfig>>,
    slots: Cache<String, CacheEntry>,
    in_flight: Mutex<HashMap<String, (RefreshMode, SharedRefresh)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    IfExpired,
    Always,
}

enum InFlight {
    /// This refresh answers the caller.
    Ready(SharedRefresh),
    /// A check-only refresh is running; wait for it, then start a forced one.
    Busy(SharedRefresh),
}

/// Clears the in-flight handle when the refresh task ends, including by panic.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.key);
    }
}

/// Process-wide cache object; cheap to clone, all clones share the slots.
#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<Inner>,
}

impl FetchCache {
    pub fn builder() -> FetchCacheBuilder {
        FetchCacheBuilder::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.resources.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Serves the freshest useful view of `key`.
    pub async fn get(&self, key: &str) -> Result<CacheResponse, FetchError> {
        let resource = self.resource(key)?;

        if let Some(entry) = self.inner.slots.get(key).await {
            if entry.is_fresh(resource.ttl) {
                tracing::debug!("Serving cached {} ({}s old)", key, entry.age().as_secs());
                return Ok(entry.to_cached_response());
            }
        }

        self.await_refresh(key, resource, RefreshMode::IfExpired).await
    }

    /// Refreshes `key` regardless of freshness, still coalescing with any
    /// forced refresh already in flight and still degrading to stale on
    /// failure. A running check-only refresh may answer from the cache, so it
    /// is waited out rather than joined.
    pub async fn refresh(&self, key: &str) -> Result<CacheResponse, FetchError> {
        let resource = self.resource(key)?;
        self.await_refresh(key, resource, RefreshMode::Always).await
    }

    pub async fn snapshot(&self) -> Vec<SlotStatus> {
        let mut statuses = Vec::with_capacity(self.inner.resources.len());

        for key in self.keys() {
            let Some(resource) = self.inner.resources.get(&key) else {
                continue;
            };
            let entry = self.inner.slots.get(&key).await;

            statuses.push(SlotStatus {
                ttl_secs: resource.ttl.as_secs(),
                cached: entry.is_some(),
                fresh: entry.as_ref().is_some_and(|e| e.is_fresh(resource.ttl)),
                age_secs: entry.as_ref().map(|e| e.age().as_secs()),
                last_fetch: entry.as_ref().map(|e| e.last_fetch),
                provenance: entry.and_then(|e| e.provenance),
                key,
            });
        }

        statuses
    }

    fn resource(&self, key: &str) -> Result<Arc<ResourceConfig>, FetchError> {
        self.inner
            .resources
            .get(key)
            .cloned()
            .ok_or_else(|| FetchError::UnknownResource(key.to_string()))
    }

    async fn await_refresh(
        &self,
        key: &str,
        resource: Arc<ResourceConfig>,
        mode: RefreshMode,
    ) -> Result<CacheResponse, FetchError> {
        loop {
            match self.join_refresh(key, Arc::clone(&resource), mode) {
                InFlight::Ready(pending) => return pending.await,
                InFlight::Busy(pending) => {
                    tracing::debug!("Waiting out check-only refresh of {} before forcing", key);
                    let _ = pending.await;
                }
            }
        }
    }

    fn join_refresh(&self, key: &str, resource: Arc<ResourceConfig>, mode: RefreshMode) -> InFlight {
        let mut in_flight = self.inner.in_flight.lock();

        if let Some((running, pending)) = in_flight.get(key) {
            if mode == RefreshMode::Always && *running == RefreshMode::IfExpired {
                return InFlight::Busy(pending.clone());
            }
            tracing::debug!("Joining in-flight refresh of {}", key);
            return InFlight::Ready(pending.clone());
        }

        // The lock is held until the handle is published, so the task cannot
        // remove its own entry before it exists.
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
        };
        let task = tokio::spawn(async move {
            // owned by the body so it drops as soon as the refresh ends
            let guard = guard;
            run_refresh(&guard.inner, &guard.key, &resource, mode).await
        });

        let inner = Arc::clone(&self.inner);
        let task_key = key.to_string();
        let pending = async move {
            match task.await {
                Ok(result) => result,
                Err(err) => fail_over(&inner, task_key, format!("refresh task failed: {}", err)).await,
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), (mode, pending.clone()));
        InFlight::Ready(pending)
    }
}

struct Fetched {
    payload: serde_json::Value,
    provenance: Option<Provenance>,
}

async fn run_refresh(
    inner: &Inner,
    key: &str,
    resource: &ResourceConfig,
    mode: RefreshMode,
) -> Result<CacheResponse, FetchError> {
    // A caller may have seen an expired slot just as a previous refresh
    // landed; serve that instead of calling upstream again.
    if mode == RefreshMode::IfExpired {
        if let Some(entry) = inner.slots.get(key).await {
            if entry.is_fresh(resource.ttl) {
                return Ok(entry.to_cached_response());
            }
        }
    }

    match fetch_attempts(key, resource).await {
        Ok(fetched) => {
            let payload = resource.validator.sanitize(key, fetched.payload);
            let entry = CacheEntry::new(payload, fetched.provenance);
            inner.slots.insert(key.to_string(), entry.clone()).await;
            tracing::info!("Stored fresh {} payload", key);
            Ok(entry.to_fresh_response())
        }
        Err(cause) => degrade(inner, key.to_string(), cause).await,
    }
}

/// Refresh task died before producing a result.
async fn fail_over(inner: &Inner, key: String, reason: String) -> Result<CacheResponse, FetchError> {
    tracing::error!("Refresh of {} aborted: {}", key, reason);
    degrade(inner, key, UpstreamError::Unreachable(reason)).await
}

async fn degrade(inner: &Inner, key: String, cause: UpstreamError) -> Result<CacheResponse, FetchError> {
    match inner.slots.get(&key).await {
        Some(entry) => {
            tracing::warn!(
                "Refresh of {} failed, serving stale payload ({}s old): {}",
                key,
                entry.age().as_secs(),
                cause
            );
            Ok(entry.to_stale_response(cause.to_string()))
        }
        None => {
            tracing::error!("Refresh of {} failed with nothing cached: {}", key, cause);
            Err(FetchError::NoDataAvailable { key, cause })
        }
    }
}

async fn fetch_attempts(key: &str, resource: &ResourceConfig) -> Result<Fetched, UpstreamError> {
    let mut last_error = UpstreamError::Unreachable("no upstream attempted".to_string());

    for (index, attempt) in resource.attempts.iter().enumerate() {
        let outcome = match tokio::time::timeout(resource.timeout, attempt.upstream.fetch()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(UpstreamError::Unreachable(format!(
                "timed out after {}s",
                resource.timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(payload) => {
                let provenance = (index > 0).then(|| Provenance {
                    source: attempt.label.clone(),
                    note: attempt.note.clone().unwrap_or_else(|| {
                        format!("Using {} data ({} unavailable)", attempt.label, resource.attempts[0].label)
                    }),
                });
                if provenance.is_some() {
                    tracing::info!("{} served from substitute source {}", key, attempt.label);
                }
                return Ok(Fetched { payload, provenance });
            }
            Err(err) => {
                tracing::warn!("{} attempt {} failed: {}", key, attempt.label, err);
                last_error = err;
            }
        }
    }

    Err(last_error)
}
