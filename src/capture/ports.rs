//! Host-facing interfaces for the two capture strategies.
//!
//! Both are object-safe and `Send + Sync` so the controller can hold them as
//! `Arc<dyn …>`.  The handles they return are owned exclusively by the
//! [`CaptureController`](super::CaptureController); dropping a handle must
//! release the microphone.
//!
//! `start` must return without waiting for the device.  Opening it may sit
//! behind an OS permission prompt, and the controller runs on the loop task.
//! Failures that only show once the device opens are sent on the channel
//! handed to `start`.

use tokio::sync::mpsc;

use super::CaptureError;

// ---------------------------------------------------------------------------
// Inline strategy
// ---------------------------------------------------------------------------

/// Events a streaming recognizer reports while a capture is armed.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Non-authoritative text for the utterance in progress.
    Interim(String),
    /// The utterance ended (trailing silence); this is its final text.
    Final(String),
    /// The recognizer gave up without hearing speech.
    NoSpeech,
    /// The recognizer failed after it started.
    Failed(CaptureError),
}

/// Streaming speech recognition running on the host.
pub trait SpeechRecognizer: Send + Sync {
    /// Acquire the microphone and begin recognition.
    ///
    /// Must fail fast with [`CaptureError::PlatformUnsupported`] when the
    /// host cannot recognize speech.  A refused microphone arrives later as
    /// [`RecognizerEvent::Failed`] with [`CaptureError::PermissionDenied`].
    fn start(
        &self,
        events: mpsc::UnboundedSender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognitionStream>, CaptureError>;
}

/// An armed recognizer.
pub trait RecognitionStream: Send {
    /// Release the microphone, discarding any not-yet-final text.
    fn stop(self: Box<Self>);
}

// ---------------------------------------------------------------------------
// RawClip strategy
// ---------------------------------------------------------------------------

/// Records raw microphone audio for later transcription.
pub trait ClipRecorder: Send + Sync {
    /// Acquire the microphone and begin recording.
    ///
    /// A device that fails to open, refused access included, is reported on
    /// `failures`.
    fn start(
        &self,
        failures: mpsc::UnboundedSender<CaptureError>,
    ) -> Result<Box<dyn Recording>, CaptureError>;
}

/// An in-progress recording.
pub trait Recording: Send {
    /// Stop recording and return everything captured so far as 16 kHz mono
    /// samples.
    fn finish(self: Box<Self>) -> Result<Vec<f32>, CaptureError>;

    /// Stop recording and throw the audio away.
    fn abort(self: Box<Self>);
}
