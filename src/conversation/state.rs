//! Loop state machine and the values it reports to the front-end.

use std::fmt;

use crate::dispatch::ChatReply;
use crate::synthesis::{PlaybackId, PlaybackTerminal, SynthesisEngine};

// ---------------------------------------------------------------------------
// LoopState
// ---------------------------------------------------------------------------

/// States of the hands-free loop.
///
/// ```text
/// Idle ──enable / start──▶ Listening
///      ──clip finalized──▶ Transcribing ──transcript──▶ Dispatching
/// Listening ──final transcript──────────────────────▶ Dispatching
/// Dispatching ──reply (spoken)──▶ Speaking
///             ──reply (text only) / failure──▶ Idle
/// Speaking ──playback ended──▶ Listening   (hands-free still on)
///          ──playback ended──▶ Idle        (hands-free off)
/// any ──disable──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    /// Nothing armed, nothing in flight that the loop is waiting on.
    #[default]
    Idle,

    /// A capture handle is armed.
    Listening,

    /// A recorded clip is being uploaded for transcription.
    Transcribing,

    /// A chat request is in flight.
    Dispatching,

    /// The reply is being prepared or spoken.
    Speaking,
}

impl LoopState {
    /// Returns `true` while some stage of a turn is active.
    ///
    /// ```
    /// use voice_conversation::conversation::LoopState;
    ///
    /// assert!(!LoopState::Idle.is_busy());
    /// assert!(LoopState::Listening.is_busy());
    /// assert!(LoopState::Transcribing.is_busy());
    /// assert!(LoopState::Dispatching.is_busy());
    /// assert!(LoopState::Speaking.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        !matches!(self, LoopState::Idle)
    }

    /// A short human-readable label for the status line.
    pub fn label(&self) -> &'static str {
        match self {
            LoopState::Idle => "Idle",
            LoopState::Listening => "Listening",
            LoopState::Transcribing => "Transcribing",
            LoopState::Dispatching => "Thinking",
            LoopState::Speaking => "Speaking",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Commands and events
// ---------------------------------------------------------------------------

/// Requests from the front-end to the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopCommand {
    /// Turn voice mode on and arm the microphone.
    EnableHandsFree,
    /// Turn voice mode off and cancel whatever is capturing or speaking.
    DisableHandsFree,
    /// Arm the microphone once.  Interrupts any reply being spoken.
    StartCapture,
    /// Finish the armed capture.
    StopCapture,
    /// Send typed text as a turn.
    SendText(String),
    /// Speak arbitrary text, e.g. an earlier reply.
    Speak(String),
    /// Stop the loop.
    Shutdown,
}

/// Which stage an [`LoopEvent::Error`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Capture,
    Transcription,
    Dispatch,
    Synthesis,
}

/// A completed turn, handed to the front-end and then forgotten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Transcript or typed text that was dispatched.
    pub input: String,
    pub reply: ChatReply,
    /// Engine that spoke the reply to the end.  `None` when the reply was
    /// not spoken, was interrupted, or every engine failed.
    pub spoken_with: Option<SynthesisEngine>,
}

/// Notifications from the loop to the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    StateChanged(LoopState),
    /// Provisional recognizer text.  Never dispatched.
    Interim(String),
    /// The authoritative transcript about to be dispatched.
    Transcript(String),
    /// A reply arrived.  Always emitted, whether or not it is spoken.
    Reply(ChatReply),
    /// The backend issued a new chat session identifier.
    SessionStarted(String),
    SpeakingStarted {
        id: PlaybackId,
        engine: SynthesisEngine,
    },
    PlaybackFinished(PlaybackTerminal),
    TurnComplete(Turn),
    Error {
        kind: ErrorKind,
        message: String,
    },
}
