//! Interfaces to the premium service, the audio output device, and the
//! local voice, plus the completion token they share.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::{PlaybackId, PlaybackOutcome, PlaybackTerminal, SynthesisEngine};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why the premium service produced no audio.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PremiumError {
    /// Network failure or timeout.
    #[error("premium synthesis request failed: {0}")]
    Transport(String),

    /// The call completed but yielded no usable audio.
    #[error("premium synthesis returned no audio: {0}")]
    Rejected(String),

    /// Authorization (401) or server-class (5xx) failure.
    #[error("premium synthesis provider failed with status {status}")]
    Provider { status: u16 },
}

impl PremiumError {
    /// `true` when the provider should not be tried again this session.
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        if status == 401 || (500..600).contains(&status) {
            Self::Provider { status }
        } else {
            Self::Rejected(format!("status {status}"))
        }
    }
}

/// A playback could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PlaybackError(pub String);

// ---------------------------------------------------------------------------
// PlaybackDone
// ---------------------------------------------------------------------------

/// Completion token handed to whatever renders a playback.
///
/// The renderer calls [`ended`](Self::ended) or [`failed`](Self::failed)
/// when it finishes.  The orchestrator shares the `settled` flag, so after a
/// cancellation both calls become no-ops and no stale terminal is emitted.
pub struct PlaybackDone {
    id: PlaybackId,
    engine: SynthesisEngine,
    settled: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<PlaybackTerminal>,
}

impl PlaybackDone {
    pub(crate) fn new(
        id: PlaybackId,
        engine: SynthesisEngine,
        settled: Arc<AtomicBool>,
        tx: mpsc::UnboundedSender<PlaybackTerminal>,
    ) -> Self {
        Self {
            id,
            engine,
            settled,
            tx,
        }
    }

    pub fn id(&self) -> PlaybackId {
        self.id
    }

    /// Playback drained naturally.
    pub fn ended(self) {
        self.settle(PlaybackOutcome::Ended);
    }

    /// Playback broke after it had started.
    pub fn failed(self, reason: impl Into<String>) {
        self.settle(PlaybackOutcome::Errored(reason.into()));
    }

    fn settle(self, outcome: PlaybackOutcome) {
        if self.settled.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(PlaybackTerminal {
            id: self.id,
            engine: self.engine,
            outcome,
        });
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Remote synthesis service.
#[async_trait]
pub trait PremiumSynthesizer: Send + Sync {
    /// Encoded audio (MP3 or WAV) for `text`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PremiumError>;
}

/// Stops an active playback.  Must not block.
pub trait PlaybackControl: Send {
    fn stop(&self);
}

/// Output device for encoded audio.
pub trait AudioPlayer: Send + Sync {
    /// Decode `audio` and start playing it.
    ///
    /// Decode and device failures are returned here, before anything is
    /// audible; `done` is then dropped unused.
    fn play(
        &self,
        audio: Vec<u8>,
        done: PlaybackDone,
    ) -> Result<Box<dyn PlaybackControl>, PlaybackError>;
}

/// Voice rendering on the local machine.
pub trait LocalVoice: Send + Sync {
    fn speak(&self, text: &str, done: PlaybackDone)
        -> Result<Box<dyn PlaybackControl>, PlaybackError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> (PlaybackDone, Arc<AtomicBool>, mpsc::UnboundedReceiver<PlaybackTerminal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let settled = Arc::new(AtomicBool::new(false));
        let done = PlaybackDone::new(
            PlaybackId(7),
            SynthesisEngine::Local,
            Arc::clone(&settled),
            tx,
        );
        (done, settled, rx)
    }

    #[test]
    fn status_classification() {
        assert!(PremiumError::from_status(401).is_definitive());
        assert!(PremiumError::from_status(500).is_definitive());
        assert!(PremiumError::from_status(503).is_definitive());
        assert!(!PremiumError::from_status(400).is_definitive());
        assert!(!PremiumError::from_status(429).is_definitive());
        assert!(!PremiumError::Transport("timeout".into()).is_definitive());
    }

    #[test]
    fn ended_emits_one_terminal() {
        let (done, settled, mut rx) = token();
        done.ended();
        assert!(settled.load(Ordering::SeqCst));
        let t = rx.try_recv().unwrap();
        assert_eq!(t.id, PlaybackId(7));
        assert_eq!(t.outcome, PlaybackOutcome::Ended);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn settled_token_is_silent() {
        let (done, settled, mut rx) = token();
        settled.store(true, Ordering::SeqCst);
        done.failed("late");
        assert!(rx.try_recv().is_err());
    }
}
