//! Core STT engine trait and the Whisper implementation.
//!
//! [`SttEngine`] is object-safe and `Send + Sync` so the inline recognizer
//! can hold it behind an `Arc<dyn SttEngine>` and call it from its worker
//! thread.
//!
//! [`WhisperEngine`] (feature `whisper`) wraps a `whisper_rs::WhisperContext`.
//! [`MockSttEngine`] (tests only) returns a pre-configured response.

use std::path::{Path, PathBuf};

use thiserror::Error;

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SttError {
    /// The GGML model file was not found at the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// `whisper_rs` failed to initialise a context or per-call state.
    #[error("whisper initialisation failed: {0}")]
    ContextInit(String),

    /// The inference pass failed.
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Fewer samples than one inference window needs.
    #[error("audio too short to transcribe")]
    AudioTooShort,
}

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Speech-to-text over 16 kHz mono `f32` PCM.
pub trait SttEngine: Send + Sync {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError>;
}

/// 0.25 s at 16 kHz.  Shorter buffers make Whisper hallucinate.
pub const MIN_AUDIO_SAMPLES: usize = 4_000;

/// Location of the GGML file for `model` (e.g. `"base.en"`) in `models_dir`.
pub fn model_path(models_dir: &Path, model: &str) -> PathBuf {
    models_dir.join(format!("ggml-{model}.bin"))
}

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

#[cfg(feature = "whisper")]
pub use whisper::WhisperEngine;

#[cfg(feature = "whisper")]
mod whisper {
    use std::path::Path;

    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    use super::{SttEngine, SttError, MIN_AUDIO_SAMPLES};

    /// Whisper-backed engine.  A fresh `WhisperState` is created per call so
    /// the engine can be shared across threads without locking.
    pub struct WhisperEngine {
        ctx: WhisperContext,
        language: String,
        n_threads: i32,
    }

    impl std::fmt::Debug for WhisperEngine {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("WhisperEngine")
                .field("language", &self.language)
                .field("n_threads", &self.n_threads)
                .finish_non_exhaustive()
        }
    }

    // SAFETY: whisper-rs declares WhisperContext Send + Sync; the weights are
    // read-only after loading.
    unsafe impl Send for WhisperEngine {}
    unsafe impl Sync for WhisperEngine {}

    impl WhisperEngine {
        /// Load a GGML model.  `language` is an ISO-639-1 code or `"auto"`.
        pub fn load(model_path: impl AsRef<Path>, language: &str) -> Result<Self, SttError> {
            let path = model_path.as_ref();
            if !path.exists() {
                return Err(SttError::ModelNotFound(path.display().to_string()));
            }
            let path_str = path.to_str().ok_or_else(|| {
                SttError::ModelNotFound(format!("non-UTF-8 model path: {}", path.display()))
            })?;

            let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
                .map_err(|e| SttError::ContextInit(e.to_string()))?;

            let n_threads = std::thread::available_parallelism()
                .map(|n| n.get().min(8) as i32)
                .unwrap_or(4);

            log::info!("stt: loaded {} ({language}, {n_threads} threads)", path.display());
            Ok(Self {
                ctx,
                language: language.to_string(),
                n_threads,
            })
        }
    }

    impl SttEngine for WhisperEngine {
        fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
            if audio.len() < MIN_AUDIO_SAMPLES {
                return Err(SttError::AudioTooShort);
            }

            let mut fp = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            let lang = (self.language != "auto").then_some(self.language.as_str());
            fp.set_language(lang);
            fp.set_n_threads(self.n_threads);
            fp.set_print_progress(false);
            fp.set_print_realtime(false);

            let mut state = self
                .ctx
                .create_state()
                .map_err(|e| SttError::ContextInit(e.to_string()))?;
            state
                .full(fp, audio)
                .map_err(|e| SttError::Transcription(e.to_string()))?;

            let n_segments = state
                .full_n_segments()
                .map_err(|e| SttError::Transcription(e.to_string()))?;

            let mut text = String::new();
            for i in 0..n_segments {
                let segment = state
                    .full_get_segment_text(i)
                    .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
                text.push_str(&segment);
            }
            Ok(text.trim().to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

/// Returns a pre-configured response and counts calls.
#[cfg(test)]
pub struct MockSttEngine {
    response: Result<String, SttError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSttEngine {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Default::default(),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl SttEngine for MockSttEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if audio.len() < MIN_AUDIO_SAMPLES {
            return Err(SttError::AudioTooShort);
        }
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_ok_returns_configured_text() {
        let engine = MockSttEngine::ok("hello");
        assert_eq!(engine.transcribe(&vec![0.0; MIN_AUDIO_SAMPLES]).unwrap(), "hello");
        assert_eq!(engine.calls(), 1);
    }

    #[test]
    fn mock_enforces_minimum_length() {
        let engine = MockSttEngine::ok("hello");
        assert_eq!(
            engine.transcribe(&vec![0.0; MIN_AUDIO_SAMPLES - 1]),
            Err(SttError::AudioTooShort)
        );
    }

    #[test]
    fn engine_is_object_safe() {
        let engine: Box<dyn SttEngine> = Box::new(MockSttEngine::err(SttError::Transcription(
            "boom".into(),
        )));
        assert!(engine.transcribe(&vec![0.0; MIN_AUDIO_SAMPLES]).is_err());
    }

    #[test]
    fn model_file_naming() {
        let path = model_path(Path::new("/models"), "base.en");
        assert_eq!(path, PathBuf::from("/models/ggml-base.en.bin"));
    }

    #[cfg(feature = "whisper")]
    #[test]
    fn load_missing_model_returns_model_not_found() {
        let result = WhisperEngine::load("/nonexistent/model.bin", "en");
        assert!(matches!(result, Err(SttError::ModelNotFound(_))));
    }
}
