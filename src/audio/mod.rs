//! Host audio — microphone in, speech out, and the signal helpers between.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → downmix → Resampler → MicrophoneRecorder buffer
//!                                                  → Endpointer (inline recognizer)
//! RawClip samples → ClipQuality → encode_wav → upload
//! premium audio bytes → RodioPlayer
//! ```

pub mod input;
pub mod playback;
pub mod quality;
pub mod resample;
pub mod vad;
pub mod wav;

pub use input::{MicrophoneRecorder, MicrophoneStream};
pub use playback::RodioPlayer;
pub use quality::{ClipQuality, ClipRejection};
pub use resample::{downmix, Resampler};
pub use vad::{Endpoint, Endpointer};
pub use wav::encode_wav;

/// Rate every component downstream of the microphone works at.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
