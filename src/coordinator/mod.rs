// src/coordinator/mod.rs
//! The single public entry point: one scrape payload in, one story out.
//!
//! A session runs `Idle → Extracting → Decoded → Hydrating → Done`, or ends
//! in `Failed`. The fast callback fires exactly once per session, with the
//! decoded story (remote image URLs still in place) or with the failure.
//! Hydration then continues in the background and, when it finishes, the
//! optional refresh callback receives the story with local image paths.
//!
//! A new `submit` never waits for or rejects on a stuck predecessor: the
//! stale session is reset and its eventual result is discarded.

mod dispatch;
mod session;

pub use dispatch::{CallbackDispatcher, CallbackJob, ChannelDispatcher, InlineDispatcher};
pub use session::{Claim, FastCallback, SessionGuard, SessionId, SessionPhase};

use crate::config::ExtractionConfig;
use crate::decoder::StoryDecoder;
use crate::error::AppError;
use crate::hydrate::{HydrationReport, ImageHydrator};
use crate::model::Story;
use session::OnceCallback;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Callback receiving the hydrated story once background image fetching ends.
pub type RefreshCallback = Box<dyn FnOnce(Story, HydrationReport) + Send + 'static>;

/// Handle on a running session.
///
/// Dropping it does not cancel the session.
pub struct SessionHandle {
    id: SessionId,
    superseded: Option<SessionId>,
    task: JoinHandle<Result<Story, AppError>>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The stale session this one forcibly replaced, if any.
    pub fn superseded(&self) -> Option<SessionId> {
        self.superseded
    }

    /// Waits for the session to end. Yields the final story (hydrated when
    /// hydration is enabled), or the error that ended the session.
    pub async fn wait(self) -> Result<Story, AppError> {
        self.task.await?
    }
}

/// Accepts scrape payloads one session at a time.
pub struct ExtractionCoordinator {
    decoder: StoryDecoder,
    hydrator: Option<ImageHydrator>,
    dispatcher: Arc<dyn CallbackDispatcher>,
    guard: Arc<SessionGuard>,
    session_timeout: Duration,
    hydration_concurrency: usize,
}

impl ExtractionCoordinator {
    /// Coordinator that hydrates images through `hydrator` after each decode.
    pub fn new(hydrator: ImageHydrator, config: &ExtractionConfig) -> Self {
        Self {
            hydrator: Some(hydrator),
            ..Self::without_hydration(config)
        }
    }

    /// Coordinator that only decodes; the refresh callback never fires.
    pub fn without_hydration(config: &ExtractionConfig) -> Self {
        Self {
            decoder: StoryDecoder::new(),
            hydrator: None,
            dispatcher: Arc::new(InlineDispatcher),
            guard: Arc::new(SessionGuard::new()),
            session_timeout: config.session_timeout,
            hydration_concurrency: config.hydration_concurrency,
        }
    }

    /// Runs callbacks through `dispatcher` instead of inline.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn CallbackDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.guard.phase()
    }

    pub fn is_extracting(&self) -> bool {
        self.guard.is_in_progress()
    }

    /// Starts a session fed by `source`, the future that eventually yields
    /// the raw payload JSON.
    ///
    /// `on_fast` fires exactly once: with the decoded story, or with
    /// [`AppError::Decode`] / [`AppError::ExtractionTimeout`]. It never fires
    /// if a newer `submit` supersedes this session first. Must be called
    /// within a tokio runtime.
    pub fn submit<S, F>(
        &self,
        source: S,
        on_fast: F,
        on_refresh: Option<RefreshCallback>,
    ) -> SessionHandle
    where
        S: Future<Output = Result<String, AppError>> + Send + 'static,
        F: FnOnce(Result<Story, AppError>) + Send + 'static,
    {
        let (id, superseded) = self.guard.begin();
        log::info!("Extraction session {} started", id);

        let callback = Arc::new(OnceCallback::new(
            id,
            Arc::clone(&self.guard),
            Arc::clone(&self.dispatcher),
            Box::new(on_fast),
        ));

        let extraction = tokio::spawn(run_extraction(
            id,
            source,
            self.decoder.clone(),
            self.hydrator.clone(),
            self.hydration_concurrency,
            Arc::clone(&self.guard),
            Arc::clone(&self.dispatcher),
            Arc::clone(&callback),
            on_refresh,
        ));

        let task = tokio::spawn(watch_deadline(id, extraction, callback, self.session_timeout));

        SessionHandle {
            id,
            superseded,
            task,
        }
    }

    /// Starts a session for a payload that is already in hand.
    pub fn submit_payload<F>(
        &self,
        raw: impl Into<String>,
        on_fast: F,
        on_refresh: Option<RefreshCallback>,
    ) -> SessionHandle
    where
        F: FnOnce(Result<Story, AppError>) + Send + 'static,
    {
        let raw = raw.into();
        self.submit(async move { Ok(raw) }, on_fast, on_refresh)
    }
}

/// Races the extraction against the session deadline.
///
/// On timeout the session fails, but the extraction task is left running:
/// whatever it produces later is refused by the exactly-once guard.
async fn watch_deadline(
    id: SessionId,
    mut extraction: JoinHandle<Result<Story, AppError>>,
    callback: Arc<OnceCallback>,
    timeout: Duration,
) -> Result<Story, AppError> {
    tokio::select! {
        joined = &mut extraction => match joined {
            Ok(result) => result,
            Err(e) => {
                let err = AppError::from(e);
                log::error!("Extraction session {} crashed: {}", id, err);
                callback.fire(Err(AppError::InternalError {
                    message: format!("extraction task for session {} crashed", id),
                    source: None,
                }));
                Err(err)
            }
        },
        _ = tokio::time::sleep(timeout) => {
            match callback.fire(Err(AppError::ExtractionTimeout { timeout })) {
                // Decoding finished in time; the deadline does not bound hydration.
                Claim::AlreadyFired => extraction.await?,
                Claim::Superseded => Err(AppError::SessionSuperseded { session: id }),
                Claim::Granted => {
                    log::warn!("Extraction session {} timed out after {:?}", id, timeout);
                    Err(AppError::ExtractionTimeout { timeout })
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_extraction<S>(
    id: SessionId,
    source: S,
    decoder: StoryDecoder,
    hydrator: Option<ImageHydrator>,
    concurrency: usize,
    guard: Arc<SessionGuard>,
    dispatcher: Arc<dyn CallbackDispatcher>,
    callback: Arc<OnceCallback>,
    on_refresh: Option<RefreshCallback>,
) -> Result<Story, AppError>
where
    S: Future<Output = Result<String, AppError>> + Send + 'static,
{
    let decoded = match source.await {
        Ok(raw) => tokio::task::spawn_blocking(move || decoder.decode(&raw))
            .await
            .map_err(AppError::from)
            .and_then(|result| result),
        Err(e) => Err(e),
    };

    let story = match decoded {
        Ok(story) => story,
        Err(e) => {
            log::warn!("Extraction session {} failed: {}", id, e);
            return match callback.fire(Err(replicate(&e))) {
                Claim::Superseded => Err(AppError::SessionSuperseded { session: id }),
                Claim::Granted | Claim::AlreadyFired => Err(e),
            };
        }
    };

    log::info!(
        "Session {} decoded '{}' with {} scene(s)",
        id,
        story.display_title(),
        story.scenes.len()
    );

    match callback.fire(Ok(story.clone())) {
        Claim::Granted => {}
        Claim::AlreadyFired => {
            return Err(AppError::InternalError {
                message: format!("session {} already completed; late story discarded", id),
                source: None,
            })
        }
        Claim::Superseded => return Err(AppError::SessionSuperseded { session: id }),
    }

    let Some(hydrator) = hydrator else {
        guard.advance(id, SessionPhase::Done);
        return Ok(story);
    };

    guard.advance(id, SessionPhase::Hydrating);
    let mut hydrated = story;
    let report = hydrator.hydrate(&mut hydrated, concurrency).await;
    guard.advance(id, SessionPhase::Done);

    if let Some(on_refresh) = on_refresh {
        let delivered = hydrated.clone();
        dispatcher.dispatch(Box::new(move || on_refresh(delivered, report)));
    }

    Ok(hydrated)
}

/// A copy of a session-ending error for the callback; the handle keeps the original.
fn replicate(err: &AppError) -> AppError {
    match err {
        AppError::Decode(message) => AppError::Decode(message.clone()),
        AppError::ExtractionTimeout { timeout } => AppError::ExtractionTimeout {
            timeout: *timeout,
        },
        AppError::SessionSuperseded { session } => AppError::SessionSuperseded {
            session: *session,
        },
        other => AppError::InternalError {
            message: other.to_string(),
            source: None,
        },
    }
}
