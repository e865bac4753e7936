// src/lib.rs
//! scene2story library: turns raw page-scrape payloads into stories with
//! locally cached images.
//!
//! # Public API
//!
//! The library exposes types organized by concern:
//! - **Error handling**: `AppError`, `FetchError`
//! - **Configuration**: `ExtractionConfig`, `RetryPolicy`, `CachePolicy`
//! - **Domain model**: `Story`, `Scene`, `ImageLocation`
//! - **Decoding**: `StoryDecoder`
//! - **Fetching**: `ImageTransport`, `HttpTransport`, `RetryingFetcher`
//! - **Caching**: `ContentCache`, `CacheSweeper`, `BottomCrop`
//! - **Hydration**: `ImageHydrator`, `HydrationReport`
//! - **Coordination**: `ExtractionCoordinator`, `SessionHandle`, dispatchers

mod analytics;
mod cache;
mod config;
mod constants;
mod coordinator;
mod decoder;
mod error;
mod error_recovery;
mod fetch;
mod hydrate;
mod model;

// --- Error Handling ---
pub use crate::error::{AppError, FetchError, Result};

// --- Configuration ---
pub use crate::config::{
    CachePolicy, CommandLineInput, ExtractionConfig, RetryPolicy, CACHE_DIR_ENV,
};

// --- Domain Model ---
pub use crate::model::{is_local_reference, ImageLocation, Scene, Story};

// --- Decoding ---
pub use crate::decoder::{dedupe_scenes, scene_key, StoryDecoder};

// --- Fetching ---
pub use crate::error_recovery::retry_with_backoff;
pub use crate::fetch::{HttpTransport, ImageTransport, RetryingFetcher};

// --- Caching ---
pub use crate::cache::{
    cache_key, plan_eviction, BottomCrop, CacheEntry, CacheStats, CacheSweeper, ContentCache,
    EvictionReport, ImagePostProcessor,
};

// --- Hydration ---
pub use crate::hydrate::{HydrationReport, ImageHydrator};

// --- Coordination ---
pub use crate::coordinator::{
    CallbackDispatcher, CallbackJob, ChannelDispatcher, Claim, ExtractionCoordinator,
    FastCallback, InlineDispatcher, RefreshCallback, SessionGuard, SessionHandle, SessionId,
    SessionPhase,
};

// --- Analytics ---
pub use crate::analytics::{measure_story, StorySummary};
