// src/constants.rs
//! Domain constants that define the operational boundaries of the system.
//!
//! Each constant is named for the domain concept it constrains. Together they
//! are the defaults behind [`ExtractionConfig`](crate::ExtractionConfig).

use std::time::Duration;

// ---------------------------------------------------------------------------
// Image cache boundaries
// ---------------------------------------------------------------------------

/// Hard ceiling for the image cache directory (500 MiB).
///
/// Crossing it after a write triggers an eviction sweep.
pub const CACHE_MAX_BYTES: u64 = 500 * 1024 * 1024;

/// Size the eviction sweep trims the cache back down to (400 MiB).
///
/// Must stay strictly below [`CACHE_MAX_BYTES`] so a sweep leaves headroom
/// and the cache does not hover at the ceiling.
pub const CACHE_CLEANUP_THRESHOLD_BYTES: u64 = 400 * 1024 * 1024;

/// Extension given to every cached image file.
pub const CACHE_FILE_EXTENSION: &str = "img";

/// Suffix of in-flight downloads. Files carrying it are never cache entries.
pub const CACHE_PARTIAL_SUFFIX: &str = "part";

/// How often the background sweeper checks the cache size.
pub const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Pixels removed from the bottom of every cached image (watermark strip).
/// Zero disables the crop.
pub const IMAGE_CROP_BOTTOM_PX: u32 = 0;

// ---------------------------------------------------------------------------
// Network boundaries
// ---------------------------------------------------------------------------

/// Time allowed to establish a connection to an image host.
pub const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for the whole response once connected.
pub const FETCH_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries after the first attempt; a fetch makes `FETCH_MAX_RETRIES + 1` attempts.
pub const FETCH_MAX_RETRIES: u32 = 2;

/// Backoff unit. The wait before retry `n` is `n * FETCH_RETRY_BASE_DELAY`.
pub const FETCH_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default User-Agent sent with image requests.
pub const FETCH_USER_AGENT: &str = concat!("scene2story/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Hydration and session boundaries
// ---------------------------------------------------------------------------

/// Upper bound on parallel image downloads for one story.
pub const HYDRATION_MAX_CONCURRENCY: usize = 32;

/// How long one image may take, retries included, before its scene gives up on it.
pub const HYDRATION_TASK_TIMEOUT: Duration = Duration::from_secs(120);

/// How long a session may wait for a payload to arrive and decode.
pub const EXTRACTION_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Separator between the text and image halves of a scene's dedup key.
pub const SCENE_KEY_SEPARATOR: &str = "||";
