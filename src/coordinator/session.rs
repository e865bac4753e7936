//! Session bookkeeping for the extraction coordinator.
//!
//! All session flags live behind one mutex and change only through methods
//! that check and transition in a single critical section. That is what keeps
//! a timeout and a late completion from both believing they won.

use super::dispatch::CallbackDispatcher;
use crate::error::AppError;
use crate::model::Story;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Monotonically increasing identity of one `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the current session stands.
///
/// `Done` and `Failed` are terminal and immediately collapse back to `Idle`;
/// they appear in logs and in [`Claim`] results, never as a resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Extracting,
    Decoded,
    Hydrating,
    Done,
    Failed,
}

/// Result of trying to fire a session's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This caller fired the callback.
    Granted,
    /// The callback already fired for this session.
    AlreadyFired,
    /// A newer session replaced this one before it completed.
    Superseded,
}

#[derive(Debug)]
struct SessionState {
    last_issued: u64,
    current: Option<SessionId>,
    in_progress: bool,
    callback_fired: bool,
    phase: SessionPhase,
}

/// The single-flight guard.
#[derive(Debug)]
pub struct SessionGuard {
    state: Mutex<SessionState>,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGuard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                last_issued: 0,
                current: None,
                in_progress: false,
                callback_fired: false,
                phase: SessionPhase::Idle,
            }),
        }
    }

    /// Starts a new session, forcibly replacing one that is still extracting.
    ///
    /// Returns the new id and, if one was overridden, the stale id.
    pub fn begin(&self) -> (SessionId, Option<SessionId>) {
        let mut state = self.state.lock();
        state.last_issued += 1;
        let id = SessionId(state.last_issued);

        let overridden = if state.in_progress { state.current } else { None };
        if let Some(stale) = overridden {
            log::warn!(
                "Session {} still in progress; forcing reset so session {} can start",
                stale,
                id
            );
        }

        state.current = Some(id);
        state.in_progress = true;
        state.callback_fired = false;
        state.phase = SessionPhase::Extracting;
        (id, overridden)
    }

    /// Atomically claims the right to fire `id`'s callback.
    ///
    /// On success the session stops counting as in progress and moves to
    /// `Decoded`, or back to `Idle` when `outcome` is `Failed`.
    pub fn claim(&self, id: SessionId, outcome: SessionPhase) -> Claim {
        let mut state = self.state.lock();
        if state.current != Some(id) {
            return Claim::Superseded;
        }
        if state.callback_fired {
            return Claim::AlreadyFired;
        }
        state.callback_fired = true;
        state.in_progress = false;
        state.phase = match outcome {
            SessionPhase::Failed => {
                log::debug!("Session {} failed", id);
                SessionPhase::Idle
            }
            _ => SessionPhase::Decoded,
        };
        Claim::Granted
    }

    /// Moves `id` to `phase` if it is still the current session.
    /// Terminal phases collapse to `Idle`.
    pub fn advance(&self, id: SessionId, phase: SessionPhase) -> bool {
        let mut state = self.state.lock();
        if state.current != Some(id) {
            return false;
        }
        state.phase = match phase {
            SessionPhase::Done | SessionPhase::Failed => {
                log::debug!("Session {} reached {:?}", id, phase);
                SessionPhase::Idle
            }
            other => other,
        };
        true
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn is_in_progress(&self) -> bool {
        self.state.lock().in_progress
    }

    pub fn current(&self) -> Option<SessionId> {
        self.state.lock().current
    }
}

/// Callback receiving the decoded story, or the reason the session failed.
pub type FastCallback = Box<dyn FnOnce(Result<Story, AppError>) + Send + 'static>;

/// Wraps a session's fast callback so it runs at most once, whichever
/// thread gets there first.
pub(crate) struct OnceCallback {
    session: SessionId,
    guard: Arc<SessionGuard>,
    dispatcher: Arc<dyn CallbackDispatcher>,
    callback: Mutex<Option<FastCallback>>,
}

impl OnceCallback {
    pub(crate) fn new(
        session: SessionId,
        guard: Arc<SessionGuard>,
        dispatcher: Arc<dyn CallbackDispatcher>,
        callback: FastCallback,
    ) -> Self {
        Self {
            session,
            guard,
            dispatcher,
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Delivers `result` unless this session's callback already fired or the
    /// session was superseded. Ignored calls are logged.
    pub(crate) fn fire(&self, result: Result<Story, AppError>) -> Claim {
        let outcome = if result.is_ok() {
            SessionPhase::Decoded
        } else {
            SessionPhase::Failed
        };

        let claim = self.guard.claim(self.session, outcome);
        match claim {
            Claim::Granted => match self.callback.lock().take() {
                Some(callback) => {
                    self.dispatcher.dispatch(Box::new(move || callback(result)));
                }
                None => log::error!(
                    "Session {} granted a callback it no longer holds",
                    self.session
                ),
            },
            Claim::AlreadyFired => {
                log::info!(
                    "Ignoring duplicate completion for session {} ({})",
                    self.session,
                    describe(&result)
                );
            }
            Claim::Superseded => {
                log::info!(
                    "Ignoring completion for superseded session {} ({})",
                    self.session,
                    describe(&result)
                );
            }
        }
        claim
    }
}

fn describe(result: &Result<Story, AppError>) -> String {
    match result {
        Ok(story) => format!("story '{}'", story.display_title()),
        Err(e) => e.to_string(),
    }
}
