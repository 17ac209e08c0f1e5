//! Capture Controller — arms and disarms audio input.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────── CaptureController ──────────────────────────┐
//! │  start_capture()                                                       │
//! │     ├─ Inline  ─▶ SpeechRecognizer::start ─▶ Interim… Final | NoSpeech │
//! │     └─ RawClip ─▶ ClipRecorder::start     ─▶ (stop | 30 s timeout)     │
//! │                                                  └─▶ AudioClip          │
//! │  next_event()  ─▶ CaptureEvent (one normalized stream for both)        │
//! │  stop_capture() / cancel()  ─▶ handle released, idempotent             │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! At most one capture handle exists at a time.  Every capture is stamped
//! with a monotonically increasing sequence number; only the transcript of
//! the most recent, non-cancelled capture is authoritative.

pub mod controller;
pub mod ports;

use thiserror::Error;

pub use controller::{CaptureController, CaptureEvent};
pub use ports::{ClipRecorder, RecognitionStream, RecognizerEvent, Recording, SpeechRecognizer};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Everything that can stop a capture from producing a transcript.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    /// `start_capture` was called while a capture handle already exists.
    #[error("a capture is already in progress")]
    CaptureInProgress,

    /// Microphone access was refused by the OS or the user.  Terminal.
    #[error("microphone access was denied")]
    PermissionDenied,

    /// The capture ended without any recognizable speech.  Non-fatal.
    #[error("no speech was detected")]
    NoSpeechDetected,

    /// Inline recognition is not available on this host.  Terminal.
    #[error("inline speech recognition is not supported on this host")]
    PlatformUnsupported,

    /// Any other input-device failure.
    #[error("audio input error: {0}")]
    Device(String),
}

impl CaptureError {
    /// `true` for failures that retrying cannot fix without user action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::PlatformUnsupported)
    }

    /// Text shown to the user, naming the remediation where there is one.
    pub fn user_message(&self) -> String {
        match self {
            Self::CaptureInProgress => "Already listening.".into(),
            Self::PermissionDenied => "Microphone access is blocked. Allow microphone access \
                 for this app in your system privacy settings, then try again."
                .into(),
            Self::NoSpeechDetected => "I didn't catch that. Please try again.".into(),
            Self::PlatformUnsupported => "Live speech recognition isn't available here. Switch \
                 the capture strategy to RawClip in settings.toml."
                .into(),
            Self::Device(detail) => format!("Microphone error: {detail}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Final text of one utterance, stamped with its capture's sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    text: String,
    seq: u64,
}

impl Transcript {
    pub(crate) fn new(text: impl Into<String>, seq: u64) -> Self {
        Self {
            text: text.into(),
            seq,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Sequence number of the capture that produced this transcript.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

// ---------------------------------------------------------------------------
// AudioClip
// ---------------------------------------------------------------------------

/// A finalized RawClip recording: 16 kHz mono `f32` PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Sequence number of the capture that recorded it.
    pub seq: u64,
    /// `true` when the clip was cut off by the maximum listen duration.
    pub timed_out: bool,
}

impl AudioClip {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
