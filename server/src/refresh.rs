//! Background prefetch of display resources
//!
//! Keeps slots warm so display clients rarely wait on an upstream. Each
//! schedule simply calls `get` on its key: a fresh slot costs nothing, an
//! expired one goes through the normal coalesced refresh.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::FetchCache;

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSchedule {
    pub key: String,
    pub interval: Duration,
}

impl RefreshSchedule {
    pub fn new(key: impl Into<String>, interval: Duration) -> Self {
        Self {
            key: key.into(),
            interval,
        }
    }
}

/// Handle for the background prefetch tasks
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Spawns one task per schedule. The first tick fires immediately so the
    /// cache is populated at startup.
    pub fn spawn(cache: FetchCache, schedules: Vec<RefreshSchedule>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = schedules
            .into_iter()
            .map(|schedule| {
                let cache = cache.clone();
                let mut shutdown_rx = shutdown_rx.clone();

                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(schedule.interval);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                match cache.get(&schedule.key).await {
                                    Ok(response) if response.stale => {
                                        tracing::warn!("Prefetch of {} is serving stale data", schedule.key);
                                    }
                                    Ok(_) => {}
                                    Err(e) => tracing::warn!("Prefetch of {} failed: {}", schedule.key, e),
                                }
                            }
                            _ = shutdown_rx.changed() => break,
                        }
                    }

                    tracing::debug!("Prefetch task for {} stopped", schedule.key);
                })
            })
            .collect();

        Self { shutdown_tx, tasks }
    }

    /// Stops every prefetch task and waits for them to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Prefetch task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ResourceConfig, UpstreamError};
    use crate::upstream::{Attempt, Upstream, UpstreamFuture};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Upstream for Counting {
        fn fetch(&self) -> UpstreamFuture<'_> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>(json!({"status": "success", "n": n}))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_runs_at_startup_and_each_interval() {
        let upstream = Arc::new(Counting::default());
        // TTL shorter than the interval so every tick reaches upstream
        let cache = FetchCache::builder()
            .resource(
                ResourceConfig::new("weather", Duration::from_secs(30))
                    .attempt(Attempt::new("open-meteo", upstream.clone())),
            )
            .build()
            .unwrap();

        let handle = RefreshHandle::spawn(cache.clone(), vec![RefreshSchedule::new("weather", Duration::from_secs(60))]);
        tokio::time::sleep(Duration::from_secs(90)).await;
        handle.shutdown().await;

        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
        let slots = cache.snapshot().await;
        assert!(slots[0].cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_of_fresh_slot_does_not_refetch() {
        let upstream = Arc::new(Counting::default());
        let cache = FetchCache::builder()
            .resource(
                ResourceConfig::new("air-quality", Duration::from_secs(30 * 60))
                    .attempt(Attempt::new("airvisual", upstream.clone())),
            )
            .build()
            .unwrap();

        let handle = RefreshHandle::spawn(cache, vec![RefreshSchedule::new("air-quality", Duration::from_secs(60))]);
        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        handle.shutdown().await;

        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }
}
