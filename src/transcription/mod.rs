//! Transcription Pipeline — turns a finalized RawClip into a [`Transcript`].
//!
//! One upload per clip, no retries.  Inline captures never pass through here;
//! their final text is already a transcript.
//!
//! Failures never produce a transcript, so nothing empty or partial can reach
//! the Dispatch Gate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::encode_wav;
use crate::capture::{AudioClip, Transcript};

// ---------------------------------------------------------------------------
// TranscriptionError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptionError {
    /// The upload failed or the service reported an error.
    #[error("transcription failed: {0}")]
    Failed(String),

    /// The service heard nothing it could turn into text.
    #[error("no speech was detected in the recording")]
    NoSpeech,
}

impl TranscriptionError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Failed(detail) => format!("Couldn't transcribe that: {detail}. Please try again."),
            Self::NoSpeech => "I didn't catch that. Please try again.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transcriber
// ---------------------------------------------------------------------------

/// Remote speech-to-text for a WAV upload.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Raw recognized text.  May be empty.
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, TranscriptionError>;
}

// ---------------------------------------------------------------------------
// TranscriptionPipeline
// ---------------------------------------------------------------------------

pub type TranscribeFuture =
    Pin<Box<dyn Future<Output = Result<Transcript, TranscriptionError>> + Send + 'static>>;

#[derive(Clone)]
pub struct TranscriptionPipeline {
    transcriber: Arc<dyn Transcriber>,
}

impl TranscriptionPipeline {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }

    /// Upload `clip` once.  The transcript carries the clip's sequence
    /// number so the caller can discard it if a newer capture superseded it.
    pub fn transcribe(&self, clip: AudioClip) -> TranscribeFuture {
        let transcriber = Arc::clone(&self.transcriber);
        Box::pin(async move {
            let seq = clip.seq;
            let wav = encode_wav(&clip.samples)
                .map_err(|e| TranscriptionError::Failed(format!("could not encode clip: {e}")))?;
            log::debug!(
                "transcription: #{seq} uploading {:.1}s clip ({} bytes)",
                clip.duration_secs(),
                wav.len()
            );

            let text = transcriber.transcribe(wav).await?;
            let text = text.trim();
            if text.is_empty() {
                log::info!("transcription: #{seq} returned no text");
                return Err(TranscriptionError::NoSpeech);
            }
            log::info!("transcription: #{seq} ok ({} chars)", text.len());
            Ok(Transcript::new(text, seq))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
