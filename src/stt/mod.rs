//! STT (speech-to-text) on this machine, used by the Inline capture strategy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  LocalRecognizer (SpeechRecognizer)                   │
//! │    MicrophoneStream ─▶ Endpointer ─▶ SttEngine        │
//! │                                       └─ WhisperEngine│
//! │  UnsupportedRecognizer ─▶ PlatformUnsupported         │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Without the `whisper` feature there is no engine to build a
//! [`LocalRecognizer`] from, and the binary wires in
//! [`UnsupportedRecognizer`] so inline capture fails fast.

pub mod engine;
pub mod recognizer;

pub use engine::{model_path, SttEngine, SttError, MIN_AUDIO_SAMPLES};
#[cfg(feature = "whisper")]
pub use engine::WhisperEngine;
pub use recognizer::{LocalRecognizer, UnsupportedRecognizer};

#[cfg(test)]
pub use engine::MockSttEngine;
