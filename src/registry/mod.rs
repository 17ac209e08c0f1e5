//! Provider Availability Registry — the premium-synthesis circuit breaker.
//!
//! The registry owns the one-way `premium_synthesis_available` flag on the
//! [`Session`](crate::session::Session):
//!
//! ```text
//! true ──probe says unavailable──▶ false
//! true ──mark_unavailable()──────▶ false
//! false ─────────────────────────▶ false   (never re-enabled in a session)
//! ```
//!
//! [`check_availability`](ProviderRegistry::check_availability) queries the
//! backend status once, the first time hands-free mode is enabled in a
//! session.  After a definitive provider failure the synthesis orchestrator
//! calls [`mark_unavailable`](ProviderRegistry::mark_unavailable) and every
//! later utterance goes straight to the local voice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::{lock_session, SharedSession};

// ---------------------------------------------------------------------------
// AvailabilityProbe
// ---------------------------------------------------------------------------

/// The availability probe could not be answered.
#[derive(Debug, Clone, Error)]
#[error("availability probe failed: {0}")]
pub struct ProbeError(pub String);

/// Status query against the premium synthesis service.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    /// `Ok(true)` when the provider reports itself usable.
    async fn premium_synthesis_available(&self) -> Result<bool, ProbeError>;
}

// ---------------------------------------------------------------------------
// ProviderRegistry
// ---------------------------------------------------------------------------

/// Tracks, per session, whether the premium synthesis provider is usable.
pub struct ProviderRegistry {
    session: SharedSession,
    probe: Arc<dyn AvailabilityProbe>,
    checked: AtomicBool,
}

impl ProviderRegistry {
    pub fn new(session: SharedSession, probe: Arc<dyn AvailabilityProbe>) -> Self {
        Self {
            session,
            probe,
            checked: AtomicBool::new(false),
        }
    }

    /// Query the provider status once per session.
    ///
    /// Later calls return the current flag without touching the network.  A
    /// probe that cannot be answered leaves the flag optimistic; the first
    /// real synthesis failure will trip the breaker instead.
    pub async fn check_availability(&self) -> bool {
        if self.checked.swap(true, Ordering::SeqCst) {
            return self.is_available();
        }

        match self.probe.premium_synthesis_available().await {
            Ok(true) => {
                log::info!("registry: premium synthesis reported available");
            }
            Ok(false) => {
                log::warn!("registry: premium synthesis reported unavailable");
                self.mark_unavailable();
            }
            Err(e) => {
                log::warn!("registry: {e}; keeping premium synthesis enabled");
            }
        }

        self.is_available()
    }

    /// Permanently disable premium synthesis for this session.  Idempotent.
    pub fn mark_unavailable(&self) {
        if lock_session(&self.session).downgrade_premium() {
            log::warn!("registry: premium synthesis disabled for the rest of the session");
        }
    }

    /// Current value of the breaker.
    pub fn is_available(&self) -> bool {
        lock_session(&self.session).premium_synthesis_available()
    }

    /// Whether the one-time probe has already run.
    pub fn has_checked(&self) -> bool {
        self.checked.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
