//! Speech Synthesis Orchestrator — speaks replies with premium or local voice.
//!
//! # Architecture
//!
//! ```text
//! speak(text)
//!   │  cancel() any active playback            (single-playback invariant)
//!   │  clean_for_speech(text)
//!   ▼
//! prepare ──▶ [Premium]* ──▶ [Local]           (ordered engine list)
//!   │            │ 401 / 5xx ──▶ registry.mark_unavailable()
//!   ▼            ▼
//! start ──▶ AudioPlayer::play | LocalVoice::speak ──▶ PlaybackControl
//!   │
//!   ▼
//! next_terminal() ──▶ PlaybackTerminal { Ended | Errored | Cancelled }
//! ```
//!
//! `*` Premium is skipped entirely once the session's circuit breaker has
//! tripped.  Every `speak`/`start` produces exactly one terminal.

pub mod local;
pub mod orchestrator;
pub mod ports;
pub mod text;

use std::fmt;

pub use local::SystemVoice;
pub use orchestrator::{PrepareFuture, PreparedSpeech, SynthesisOrchestrator};
pub use ports::{
    AudioPlayer, LocalVoice, PlaybackControl, PlaybackDone, PlaybackError, PremiumError,
    PremiumSynthesizer,
};
pub use text::clean_for_speech;

// ---------------------------------------------------------------------------
// SynthesisEngine
// ---------------------------------------------------------------------------

/// Where the spoken audio came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SynthesisEngine {
    /// Remote high-quality synthesis service.
    Premium,
    /// Voice rendered on this machine.
    Local,
}

impl SynthesisEngine {
    pub fn label(self) -> &'static str {
        match self {
            Self::Premium => "premium",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SynthesisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Playback identity and terminal events
// ---------------------------------------------------------------------------

/// Identity of one playback, used for stale-handle checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a playback finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Ended,
    Errored(String),
    Cancelled,
}

/// The single terminal event of a playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackTerminal {
    pub id: PlaybackId,
    pub engine: SynthesisEngine,
    pub outcome: PlaybackOutcome,
}

impl PlaybackTerminal {
    pub fn is_cancelled(&self) -> bool {
        self.outcome == PlaybackOutcome::Cancelled
    }
}
