//! Per-session conversation context.
//!
//! [`Session`] is created once when the orchestrator starts and is the only
//! mutable state shared between components.  It is held behind
//! [`SharedSession`] (`Arc<Mutex<Session>>`) and written by exactly two
//! owners:
//!
//! * the [`ProviderRegistry`](crate::registry::ProviderRegistry): the
//!   premium-synthesis circuit breaker, and
//! * the [`DispatchGate`](crate::dispatch::DispatchGate): the chat session
//!   identifier handed out by the backend.
//!
//! The loop controller toggles the hands-free flag.  Everything else only
//! reads.  Locks are short and never held across an `.await`.

pub mod store;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::CaptureStrategy;

pub use store::{SessionStore, SessionStoreError};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Mutable state for one conversation session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Opaque chat session identifier.  `None` until the first successful
    /// dispatch (or until restored from the [`SessionStore`]).
    session_id: Option<String>,

    /// Which capture strategy the Capture Controller uses.
    pub capture_strategy: CaptureStrategy,

    /// Whether the autonomous listen → dispatch → speak loop is active.
    pub hands_free: bool,

    /// Speak replies even outside hands-free mode.
    auto_speak: bool,

    /// Premium synthesis circuit breaker.  Starts `true`; only ever moves to
    /// `false` for the lifetime of this session.
    premium_synthesis_available: bool,
}

impl Session {
    /// Start a fresh session with an optimistic premium-synthesis flag.
    pub fn new(capture_strategy: CaptureStrategy, auto_speak: bool) -> Self {
        Self {
            session_id: None,
            capture_strategy,
            hands_free: false,
            auto_speak,
            premium_synthesis_available: true,
        }
    }

    /// Seed the session with a previously persisted chat identifier.
    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Current chat session identifier, if the backend has issued one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// `true` when replies should be spoken.  Always `true` while hands-free
    /// mode is on.
    pub fn auto_speak(&self) -> bool {
        self.auto_speak || self.hands_free
    }

    /// Set the user's explicit auto-speak preference.
    pub fn set_auto_speak(&mut self, enabled: bool) {
        self.auto_speak = enabled;
    }

    /// Whether the premium synthesis provider may still be used.
    pub fn premium_synthesis_available(&self) -> bool {
        self.premium_synthesis_available
    }

    /// Trip the premium-synthesis breaker.  Returns `true` if this call
    /// changed the flag.
    pub(crate) fn downgrade_premium(&mut self) -> bool {
        std::mem::replace(&mut self.premium_synthesis_available, false)
    }

    /// Replace the stored chat identifier.  Returns `true` when the value
    /// actually changed.
    pub(crate) fn adopt_session_id(&mut self, session_id: String) -> bool {
        if self.session_id.as_deref() == Some(session_id.as_str()) {
            return false;
        }
        self.session_id = Some(session_id);
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(CaptureStrategy::default(), false)
    }
}

// ---------------------------------------------------------------------------
// SharedSession
// ---------------------------------------------------------------------------

/// Thread-safe handle to the single [`Session`].
///
/// Cheap to clone.  Lock with [`lock_session`] for a short critical section;
/// do **not** hold the guard across `.await` points.
pub type SharedSession = Arc<Mutex<Session>>;

/// Wrap `session` in a [`SharedSession`].
pub fn new_shared_session(session: Session) -> SharedSession {
    Arc::new(Mutex::new(session))
}

/// Lock the session, recovering the data if a previous holder panicked.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
