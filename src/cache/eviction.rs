//! LRU eviction for the on-disk image cache.
//!
//! Scanning and planning are separate so the ordering rule can be tested
//! without a filesystem. A scan is advisory: it may race a fresh write, which
//! is harmless because a just-written entry has the newest access time and
//! is considered last.

use super::{CacheEntry, CacheStats};
use crate::constants::{CACHE_FILE_EXTENSION, CACHE_PARTIAL_SUFFIX};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Outcome of one eviction sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub removed: Vec<PathBuf>,
    pub failures: usize,
}

impl EvictionReport {
    pub fn freed_bytes(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Lists every complete cache entry in `dir`. Partial downloads and foreign
/// files are skipped.
pub async fn scan_entries(dir: &Path) -> Result<Vec<CacheEntry>, AppError> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| AppError::cache_io(dir, e))?;
    let mut entries = Vec::new();

    while let Some(dir_entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| AppError::cache_io(dir, e))?
    {
        let path = dir_entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(CACHE_FILE_EXTENSION) {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        // The file may vanish between listing and stat; that is not an error.
        let Ok(metadata) = dir_entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let last_access = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        entries.push(CacheEntry {
            key,
            path,
            size_bytes: metadata.len(),
            last_access,
        });
    }

    Ok(entries)
}

pub fn summarize(entries: &[CacheEntry]) -> CacheStats {
    CacheStats {
        entries: entries.len(),
        total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
    }
}

/// Chooses which entries to delete: oldest access first, until the total is
/// at or below `threshold`. `protect` is never chosen.
pub fn plan_eviction(
    mut entries: Vec<CacheEntry>,
    threshold: u64,
    protect: Option<&Path>,
) -> Vec<CacheEntry> {
    let mut total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    if total <= threshold {
        return Vec::new();
    }

    entries.sort_by(|a, b| a.last_access.cmp(&b.last_access).then_with(|| a.key.cmp(&b.key)));

    let mut victims = Vec::new();
    for entry in entries {
        if total <= threshold {
            break;
        }
        if protect == Some(entry.path.as_path()) {
            continue;
        }
        total -= entry.size_bytes;
        victims.push(entry);
    }
    victims
}

/// Deletes the planned entries, best-effort. A failed delete is logged and
/// counted, and the sweep carries on.
pub async fn remove_entries(victims: Vec<CacheEntry>, report: &mut EvictionReport) {
    for victim in victims {
        match tokio::fs::remove_file(&victim.path).await {
            Ok(()) => {
                log::debug!(
                    "Evicted {} ({} bytes, last access {})",
                    victim.key,
                    victim.size_bytes,
                    victim.last_access
                );
                report.bytes_after = report.bytes_after.saturating_sub(victim.size_bytes);
                report.removed.push(victim.path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                report.bytes_after = report.bytes_after.saturating_sub(victim.size_bytes);
            }
            Err(e) => {
                log::warn!("{}", AppError::cache_io(&victim.path, e));
                report.failures += 1;
            }
        }
    }
}

/// True for `<key>.<ext>.<id>.part` files left by interrupted downloads.
pub fn is_partial(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(CACHE_PARTIAL_SUFFIX)
}
