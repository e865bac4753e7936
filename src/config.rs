// src/config.rs
use crate::constants::*;
use crate::error::AppError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides the default cache directory.
pub const CACHE_DIR_ENV: &str = "SCENE2STORY_CACHE_DIR";

/// Returns `$XDG_CACHE_HOME/scene2story/images` (or `~/.cache/scene2story/images`).
fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".cache")
        })
        .join("scene2story")
        .join("images")
}

/// Parsed command-line input.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineInput {
    /// Path to a raw scrape payload (JSON), or "-" to read stdin
    pub payload: String,

    /// Directory for cached images (defaults to the user cache dir)
    #[arg(short = 'd', long)]
    pub cache_dir: Option<String>,

    /// Cache ceiling in MiB
    #[arg(long, default_value_t = CACHE_MAX_BYTES / (1024 * 1024))]
    pub cache_max_mb: u64,

    /// Size in MiB the cache is trimmed back to once the ceiling is crossed
    #[arg(long, default_value_t = CACHE_CLEANUP_THRESHOLD_BYTES / (1024 * 1024))]
    pub cache_cleanup_mb: u64,

    /// Retries per image after the first attempt
    #[arg(long, default_value_t = FETCH_MAX_RETRIES)]
    pub retries: u32,

    /// Backoff unit between retries, in milliseconds
    #[arg(long, default_value_t = FETCH_RETRY_BASE_DELAY.as_millis() as u64)]
    pub retry_delay_ms: u64,

    /// Number of concurrent image downloads (default: auto, max 32)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Seconds to wait for the payload to decode
    #[arg(long, default_value_t = EXTRACTION_SESSION_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Pixels to crop from the bottom of each downloaded image
    #[arg(long, default_value_t = IMAGE_CROP_BOTTOM_PX)]
    pub crop_bottom: u32,

    /// Skip image hydration and print only the decoded story
    #[arg(long, default_value_t = false)]
    pub no_hydrate: bool,

    /// Print only the hydrated story
    #[arg(long, default_value_t = false)]
    pub final_only: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Every tunable the extraction core consumes.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub cache_dir: PathBuf,
    pub cache_max_bytes: u64,
    pub cache_cleanup_threshold_bytes: u64,
    pub sweep_interval: Duration,
    pub crop_bottom_px: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub hydration_concurrency: usize,
    pub hydration_task_timeout: Duration,
    pub session_timeout: Duration,
}

impl ExtractionConfig {
    /// Resolves a validated configuration from CLI input and environment.
    pub fn resolve(cli: &CommandLineInput) -> Result<Self, AppError> {
        let config = ExtractionConfig {
            cache_dir: cli
                .cache_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(default_cache_dir),
            cache_max_bytes: cli.cache_max_mb * 1024 * 1024,
            cache_cleanup_threshold_bytes: cli.cache_cleanup_mb * 1024 * 1024,
            max_retries: cli.retries,
            retry_base_delay: Duration::from_millis(cli.retry_delay_ms),
            hydration_concurrency: cli
                .concurrency
                .unwrap_or_else(default_concurrency)
                .clamp(1, HYDRATION_MAX_CONCURRENCY),
            session_timeout: Duration::from_secs(cli.timeout),
            crop_bottom_px: cli.crop_bottom,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the cache and coordinator cannot honour.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.cache_cleanup_threshold_bytes >= self.cache_max_bytes {
            return Err(AppError::InvalidConfiguration(format!(
                "cache cleanup threshold ({} bytes) must be below the cache maximum ({} bytes)",
                self.cache_cleanup_threshold_bytes, self.cache_max_bytes
            )));
        }
        if self.hydration_concurrency == 0 {
            return Err(AppError::InvalidConfiguration(
                "hydration concurrency must be at least 1".to_string(),
            ));
        }
        if self.session_timeout.is_zero() || self.hydration_task_timeout.is_zero() {
            return Err(AppError::InvalidConfiguration(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry settings for the image fetcher.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
        }
    }

    /// Size and placement settings for the image cache.
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            dir: self.cache_dir.clone(),
            max_bytes: self.cache_max_bytes,
            cleanup_threshold_bytes: self.cache_cleanup_threshold_bytes,
        }
    }
}

/// Network workers wait on I/O, so more of them than cores is fine.
fn default_concurrency() -> usize {
    num_cpus::get().clamp(4, 16)
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_max_bytes: CACHE_MAX_BYTES,
            cache_cleanup_threshold_bytes: CACHE_CLEANUP_THRESHOLD_BYTES,
            sweep_interval: CACHE_SWEEP_INTERVAL,
            crop_bottom_px: IMAGE_CROP_BOTTOM_PX,
            connect_timeout: FETCH_CONNECT_TIMEOUT,
            read_timeout: FETCH_READ_TIMEOUT,
            max_retries: FETCH_MAX_RETRIES,
            retry_base_delay: FETCH_RETRY_BASE_DELAY,
            hydration_concurrency: default_concurrency(),
            hydration_task_timeout: HYDRATION_TASK_TIMEOUT,
            session_timeout: EXTRACTION_SESSION_TIMEOUT,
        }
    }
}

/// How the fetcher retries a single image.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Total attempts, the first one included.
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Wait before attempt `attempt` (1-based). Linear: `base_delay * (attempt - 1)`,
    /// so the first attempt goes out immediately.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        ExtractionConfig::default().retry_policy()
    }
}

/// Where the cache lives and how large it may grow.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub dir: PathBuf,
    pub max_bytes: u64,
    pub cleanup_threshold_bytes: u64,
}
