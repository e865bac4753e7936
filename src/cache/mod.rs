// src/cache/mod.rs
//! Size-bounded, content-addressed image cache on local disk.
//!
//! The cache is one flat directory of `<sha256(ref)>.img` files. A file's
//! modification time doubles as its last-access time: hits touch it, and the
//! eviction sweep removes the oldest files first.
//!
//! Concurrent fetches for different references run in parallel. Fetches for
//! the same reference are serialized on a per-key lock, so the second caller
//! finds the first caller's file instead of downloading again.

mod eviction;
mod keys;
mod postprocess;
mod sweeper;

pub use eviction::{plan_eviction, EvictionReport};
pub use keys::cache_key;
pub use postprocess::{BottomCrop, ImagePostProcessor};
pub use sweeper::CacheSweeper;

use crate::config::CachePolicy;
use crate::constants::{CACHE_FILE_EXTENSION, CACHE_PARTIAL_SUFFIX};
use crate::error::AppError;
use crate::fetch::RetryingFetcher;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;

/// One cached image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub last_access: DateTime<Utc>,
}

/// Aggregate size of the cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Maps image references to durable local files.
///
/// Owns its directory exclusively: nothing else in the crate writes there.
pub struct ContentCache {
    policy: CachePolicy,
    fetcher: RetryingFetcher,
    post_processor: Option<Arc<dyn ImagePostProcessor>>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    sweep_lock: Mutex<()>,
}

impl ContentCache {
    /// Opens (creating if needed) the cache directory and clears leftovers
    /// from interrupted downloads.
    pub async fn open(policy: CachePolicy, fetcher: RetryingFetcher) -> Result<Self, AppError> {
        tokio::fs::create_dir_all(&policy.dir)
            .await
            .map_err(|e| AppError::cache_io(&policy.dir, e))?;

        let cache = Self {
            policy,
            fetcher,
            post_processor: None,
            in_flight: DashMap::new(),
            sweep_lock: Mutex::new(()),
        };
        cache.remove_partials().await;

        log::info!("Image cache ready at {}", cache.policy.dir.display());
        Ok(cache)
    }

    /// Installs a hook that runs after every successful download.
    pub fn with_post_processor(mut self, processor: Arc<dyn ImagePostProcessor>) -> Self {
        self.post_processor = Some(processor);
        self
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn dir(&self) -> &Path {
        &self.policy.dir
    }

    /// Where the file for `reference` lives, whether or not it exists yet.
    pub fn path_for(&self, reference: &str) -> PathBuf {
        self.path_for_key(&cache_key(reference))
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.policy
            .dir
            .join(format!("{}.{}", key, CACHE_FILE_EXTENSION))
    }

    /// Returns a local path for `reference`, downloading it on a miss.
    ///
    /// `None` means the image is permanently unavailable (retries exhausted
    /// or the file could not be written). That is never fatal to the caller.
    pub async fn fetch(&self, reference: &str) -> Option<PathBuf> {
        match self.try_fetch(reference).await {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Image unavailable, scene will go without it: {}", e);
                None
            }
        }
    }

    /// Like [`fetch`](Self::fetch), but reports why the image is unavailable.
    pub async fn try_fetch(&self, reference: &str) -> Result<PathBuf, AppError> {
        let key = cache_key(reference);
        let path = self.path_for_key(&key);

        if self.lookup(&path).await {
            log::debug!("Cache hit: {}", reference);
            return Ok(path);
        }

        let slot = InFlightSlot::claim(&self.in_flight, key);
        let _claim = slot.lock.lock().await;
        // Whoever held the claim before us may have just written the file.
        if self.lookup(&path).await {
            log::debug!("Reused concurrent download: {}", reference);
            Ok(path)
        } else {
            log::debug!("Cache miss: {}", reference);
            self.download(reference, path).await
        }
    }

    /// A hit is an existing, non-empty file. Hits refresh the access time.
    async fn lookup(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() && metadata.len() > 0 => {
                if let Err(e) = touch(path.to_path_buf()).await {
                    log::debug!("Could not refresh access time: {}", e);
                }
                true
            }
            _ => false,
        }
    }

    async fn download(&self, reference: &str, path: PathBuf) -> Result<PathBuf, AppError> {
        let bytes = self.fetcher.fetch(reference).await?;
        self.persist(&path, &bytes).await?;
        log::info!("Cached {} ({} bytes)", reference, bytes.len());

        self.post_process(&path).await;
        self.evict_if_over_max(&path).await;
        Ok(path)
    }

    /// Write-then-rename, so a reader either sees the whole file or none of it.
    async fn persist(&self, path: &Path, bytes: &[u8]) -> Result<(), AppError> {
        let mut staged = path.as_os_str().to_owned();
        staged.push(format!(
            ".{}.{}",
            uuid::Uuid::new_v4().simple(),
            CACHE_PARTIAL_SUFFIX
        ));
        let staged = PathBuf::from(staged);

        if let Err(e) = tokio::fs::write(&staged, bytes).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(AppError::cache_io(&staged, e));
        }
        if let Err(e) = tokio::fs::rename(&staged, path).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(AppError::cache_io(path, e));
        }
        Ok(())
    }

    async fn post_process(&self, path: &Path) {
        let Some(processor) = self.post_processor.clone() else {
            return;
        };
        let target = path.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || {
            let name = processor.name().to_string();
            processor.process(&target).map_err(|e| (name, e))
        })
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err((name, e))) => {
                log::warn!(
                    "Post-processor {} failed for {}, keeping original: {}",
                    name,
                    path.display(),
                    e
                );
            }
            Err(e) => log::warn!("Post-processor task for {} failed: {}", path.display(), e),
        }
    }

    /// Lists every complete entry currently on disk.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>, AppError> {
        eviction::scan_entries(&self.policy.dir).await
    }

    pub async fn stats(&self) -> Result<CacheStats, AppError> {
        Ok(eviction::summarize(&self.entries().await?))
    }

    /// Trims the cache to the cleanup threshold, oldest entries first.
    ///
    /// Used by the periodic sweeper and at shutdown. Errors are logged and
    /// the sweep continues with the remaining entries.
    pub async fn evict(&self) -> EvictionReport {
        let _sweep = self.sweep_lock.lock().await;
        self.sweep(None).await
    }

    /// Post-write check: sweep only once the hard maximum is crossed, then
    /// trim down to the (lower) cleanup threshold.
    ///
    /// Waits for any running sweep and rescans afterwards, since that sweep
    /// may have listed the directory before this file landed.
    async fn evict_if_over_max(&self, just_written: &Path) {
        let _sweep = self.sweep_lock.lock().await;
        let total = match self.entries().await {
            Ok(entries) => eviction::summarize(&entries).total_bytes,
            Err(e) => {
                log::warn!("Cache size check failed: {}", e);
                return;
            }
        };
        if total > self.policy.max_bytes {
            log::info!(
                "Cache at {} bytes exceeds maximum {}, sweeping",
                total,
                self.policy.max_bytes
            );
            self.sweep(Some(just_written)).await;
        }
    }

    async fn sweep(&self, protect: Option<&Path>) -> EvictionReport {
        let entries = match self.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Eviction scan failed: {}", e);
                return EvictionReport {
                    failures: 1,
                    ..EvictionReport::default()
                };
            }
        };

        let before = eviction::summarize(&entries).total_bytes;
        let mut report = EvictionReport {
            bytes_before: before,
            bytes_after: before,
            ..EvictionReport::default()
        };

        let victims = plan_eviction(entries, self.policy.cleanup_threshold_bytes, protect);
        if victims.is_empty() {
            return report;
        }

        eviction::remove_entries(victims, &mut report).await;
        log::info!(
            "Eviction removed {} file(s), freed {} bytes ({} -> {}){}",
            report.removed.len(),
            report.freed_bytes(),
            report.bytes_before,
            report.bytes_after,
            if report.failures > 0 {
                format!(", {} failure(s)", report.failures)
            } else {
                String::new()
            }
        );
        report
    }

    async fn remove_partials(&self) {
        let Ok(mut dir) = tokio::fs::read_dir(&self.policy.dir).await else {
            return;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if eviction::is_partial(&path) {
                log::debug!("Removing stale partial download {}", path.display());
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
    }
}

/// A caller's share of a key's in-flight lock.
///
/// The map entry is dropped with the last share, also when the fetch future
/// is cancelled while waiting or downloading.
struct InFlightSlot<'a> {
    in_flight: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl<'a> InFlightSlot<'a> {
    fn claim(in_flight: &'a DashMap<String, Arc<Mutex<()>>>, key: String) -> Self {
        let lock = in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        Self {
            in_flight,
            key,
            lock,
        }
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        // The map and this slot hold the only two references.
        self.in_flight.remove_if(&self.key, |_, claim| {
            Arc::ptr_eq(claim, &self.lock) && Arc::strong_count(claim) == 2
        });
    }
}

/// Marks a cache file as just used.
async fn touch(path: PathBuf) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(SystemTime::now()))
            .map_err(|e| AppError::cache_io(&path, e))
    })
    .await?
}
