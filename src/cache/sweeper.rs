use super::{ContentCache, EvictionReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Background task that trims the cache on a fixed interval, independent of writes.
///
/// Dropping the sweeper stops it; [`shutdown`](Self::shutdown) also runs one
/// last sweep.
pub struct CacheSweeper {
    cache: Arc<ContentCache>,
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    pub fn spawn(cache: Arc<ContentCache>, interval: Duration) -> Self {
        let task_cache = Arc::clone(&cache);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = task_cache.evict().await;
                if !report.removed.is_empty() {
                    log::debug!("Periodic sweep freed {} bytes", report.freed_bytes());
                }
            }
        });
        log::debug!("Cache sweeper running every {:?}", interval);
        Self { cache, handle }
    }

    /// Stops the periodic task and performs a final sweep.
    pub async fn shutdown(self) -> EvictionReport {
        self.handle.abort();
        log::debug!("Cache sweeper stopped, running final sweep");
        self.cache.evict().await
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
