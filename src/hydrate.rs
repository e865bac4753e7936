// src/hydrate.rs
//! Replaces a story's remote image references with cached local files.
//!
//! One download task per distinct reference, bounded by a semaphore. Each
//! task has its own deadline; a task that misses it is dropped, which
//! cancels the download at its next await point. Failures stay local to
//! the scenes that referenced the image.

use crate::cache::ContentCache;
use crate::model::{ImageLocation, Story};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ImageOutcome {
    Resolved(PathBuf),
    Failed,
    TimedOut,
}

/// What happened to a story's images during one hydration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Distinct remote references that were submitted.
    pub requested: usize,
    pub resolved: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Scenes whose image reference was cleared.
    pub scenes_cleared: usize,
    pub duration_ms: u64,
}

impl HydrationReport {
    pub fn is_complete(&self) -> bool {
        self.resolved == self.requested
    }
}

impl fmt::Display for HydrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} image(s) resolved, {} failed, {} timed out",
            self.resolved, self.requested, self.failed, self.timed_out
        )
    }
}

/// Bridges decoded stories and the image cache.
#[derive(Clone)]
pub struct ImageHydrator {
    cache: Arc<ContentCache>,
    task_timeout: Duration,
}

impl ImageHydrator {
    pub fn new(cache: Arc<ContentCache>, task_timeout: Duration) -> Self {
        Self {
            cache,
            task_timeout,
        }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Downloads every remote image in `story` and rewrites the scenes in place.
    ///
    /// Scene order is untouched. Returns once every task has resolved,
    /// failed or timed out.
    pub async fn hydrate(&self, story: &mut Story, concurrency_limit: usize) -> HydrationReport {
        let started = Instant::now();
        let references: Vec<String> = story
            .remote_image_refs()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut report = HydrationReport {
            requested: references.len(),
            ..HydrationReport::default()
        };
        if references.is_empty() {
            return report;
        }

        let limit = concurrency_limit.max(1);
        log::info!(
            "Hydrating {} image(s) for '{}' with {} worker(s)",
            references.len(),
            story.display_title(),
            limit
        );

        let outcomes = self.fetch_all(references, limit).await;
        for outcome in outcomes.values() {
            match outcome {
                ImageOutcome::Resolved(_) => report.resolved += 1,
                ImageOutcome::Failed => report.failed += 1,
                ImageOutcome::TimedOut => report.timed_out += 1,
            }
        }
        // A task that panicked never reported back.
        report.failed += report.requested - outcomes.len();

        report.scenes_cleared = apply_outcomes(story, &outcomes);
        report.duration_ms = started.elapsed().as_millis() as u64;

        log::info!(
            "Hydration of '{}' finished in {}ms: {} resolved, {} failed, {} timed out",
            story.display_title(),
            report.duration_ms,
            report.resolved,
            report.failed,
            report.timed_out
        );
        report
    }

    async fn fetch_all(
        &self,
        references: Vec<String>,
        limit: usize,
    ) -> HashMap<String, ImageOutcome> {
        let permits = Arc::new(Semaphore::new(limit));
        let mut join_set = JoinSet::new();

        for reference in references {
            let cache = Arc::clone(&self.cache);
            let permits = Arc::clone(&permits);
            let timeout = self.task_timeout;

            join_set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (reference, ImageOutcome::Failed);
                };
                let outcome = match tokio::time::timeout(timeout, cache.fetch(&reference)).await {
                    Ok(Some(path)) => ImageOutcome::Resolved(path),
                    Ok(None) => ImageOutcome::Failed,
                    Err(_) => {
                        log::warn!(
                            "Image {} timed out after {:?}, dropping it",
                            reference,
                            timeout
                        );
                        ImageOutcome::TimedOut
                    }
                };
                (reference, outcome)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((reference, outcome)) => {
                    outcomes.insert(reference, outcome);
                }
                Err(e) => log::error!("Image task failed with join error: {}", e),
            }
        }
        outcomes
    }
}

/// Writes each outcome back onto every scene sharing the reference.
/// Returns how many scenes lost their image.
fn apply_outcomes(story: &mut Story, outcomes: &HashMap<String, ImageOutcome>) -> usize {
    let mut cleared = 0;
    for scene in &mut story.scenes {
        let ImageLocation::Remote(reference) = scene.image_location() else {
            continue;
        };
        match outcomes.get(reference) {
            Some(ImageOutcome::Resolved(path)) => {
                scene.image_ref = Some(path.to_string_lossy().into_owned());
            }
            _ => {
                scene.image_ref = None;
                cleared += 1;
            }
        }
    }
    cleared
}
