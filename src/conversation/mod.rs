//! Hands-free loop controller.
//!
//! This module chains the stage components into one conversation and exposes
//! the command / event surface a front-end drives.
//!
//! # Architecture
//!
//! ```text
//! LoopCommand (mpsc)                                  LoopEvent (mpsc)
//!        │                                                   ▲
//!        ▼                                                   │
//! ConversationLoop::run()  ← async tokio task ───────────────┘
//!        │
//!        ├─ CaptureController      Listening
//!        ├─ TranscriptionPipeline  Transcribing   (RawClip only)
//!        ├─ DispatchGate           Dispatching
//!        └─ SynthesisOrchestrator  Speaking ──ended──▶ Listening (hands-free)
//! ```
//!
//! Turns never overlap: capture re-arms only after the previous turn's
//! playback reached its terminal event.  Starting a capture while a reply
//! is being spoken cancels the playback first (barge-in).

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::ConversationLoop;
pub use state::{ErrorKind, LoopCommand, LoopEvent, LoopState, Turn};
