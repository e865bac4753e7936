//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use scene2story::{
    CachePolicy, ContentCache, FetchError, ImageHydrator, ImageTransport, RetryPolicy,
    RetryingFetcher,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory image host.
///
/// Each URL fails a configured number of times before answering, and every
/// request is counted so tests can assert on network traffic.
#[derive(Default)]
pub struct ScriptedTransport {
    failures_before_success: parking_lot::Mutex<HashMap<String, u32>>,
    attempts: parking_lot::Mutex<HashMap<String, u32>>,
    delays: parking_lot::Mutex<HashMap<String, Duration>>,
    default_delay: parking_lot::Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `url` fails `times` times, then succeeds. `u32::MAX` means never.
    pub fn fail(&self, url: &str, times: u32) -> &Self {
        self.failures_before_success
            .lock()
            .insert(url.to_string(), times);
        self
    }

    pub fn delay(&self, url: &str, delay: Duration) -> &Self {
        self.delays.lock().insert(url.to_string(), delay);
        self
    }

    pub fn delay_all(&self, delay: Duration) -> &Self {
        *self.default_delay.lock() = delay;
        self
    }

    pub fn attempts(&self, url: &str) -> u32 {
        self.attempts.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Body served for `url`: deterministic and non-empty.
    pub fn body_for(url: &str) -> Vec<u8> {
        let mut body = b"IMG:".to_vec();
        body.extend_from_slice(url.as_bytes());
        body
    }
}

#[async_trait::async_trait]
impl ImageTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let counter = attempts.entry(url.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .lock()
            .get(url)
            .copied()
            .unwrap_or(*self.default_delay.lock());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failures = self
            .failures_before_success
            .lock()
            .get(url)
            .copied()
            .unwrap_or(0);
        if attempt <= failures {
            return Err(FetchError::HttpStatus(503));
        }
        Ok(Self::body_for(url))
    }
}

pub fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(2),
        ..RetryPolicy::default()
    }
}

pub fn policy_in(dir: &Path, max_bytes: u64, cleanup_threshold_bytes: u64) -> CachePolicy {
    CachePolicy {
        dir: dir.to_path_buf(),
        max_bytes,
        cleanup_threshold_bytes,
    }
}

pub async fn open_cache(
    dir: &Path,
    transport: Arc<ScriptedTransport>,
    max_retries: u32,
) -> Arc<ContentCache> {
    let fetcher = RetryingFetcher::new(transport, fast_retries(max_retries));
    Arc::new(
        ContentCache::open(policy_in(dir, 10 * 1024 * 1024, 8 * 1024 * 1024), fetcher)
            .await
            .expect("cache opens in a temp dir"),
    )
}

pub fn hydrator(cache: Arc<ContentCache>, task_timeout: Duration) -> ImageHydrator {
    ImageHydrator::new(cache, task_timeout)
}

/// Names of the files in `dir`, sorted.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("readable dir")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
