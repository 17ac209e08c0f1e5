//! On-device streaming recognizer for the Inline capture strategy.
//!
//! ```text
//! MicrophoneStream ──frames──▶ RecognitionWorker (own thread)
//!                                 │ Endpointer.push
//!                                 │   every interim_interval of speech ─▶ Interim(text)
//!                                 │   trailing silence                 ─▶ Final(text) | NoSpeech
//!                                 ▼
//!                         RecognizerEvent channel ─▶ CaptureController
//! ```
//!
//! The worker transcribes the whole utterance so far for each interim, which
//! is fine for the short utterances of a voice conversation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use super::{SttEngine, SttError};
use crate::audio::{Endpoint, Endpointer, MicrophoneStream, TARGET_SAMPLE_RATE};
use crate::capture::{CaptureError, RecognitionStream, RecognizerEvent, SpeechRecognizer};
use crate::config::CaptureConfig;

// ---------------------------------------------------------------------------
// LocalRecognizer
// ---------------------------------------------------------------------------

/// Microphone + energy endpointing + an [`SttEngine`].
pub struct LocalRecognizer {
    engine: Arc<dyn SttEngine>,
    config: CaptureConfig,
}

impl LocalRecognizer {
    pub fn new(engine: Arc<dyn SttEngine>, config: &CaptureConfig) -> Self {
        Self {
            engine,
            config: config.clone(),
        }
    }
}

impl SpeechRecognizer for LocalRecognizer {
    fn start(
        &self,
        events: UnboundedSender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognitionStream>, CaptureError> {
        let (frames_tx, frames_rx) = std::sync::mpsc::channel::<Vec<f32>>();
        let failures = events.clone();
        let mic = MicrophoneStream::open(
            move |samples| {
                let _ = frames_tx.send(samples.to_vec());
            },
            move |e| {
                let _ = failures.send(RecognizerEvent::Failed(e));
            },
        )?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = RecognitionWorker::new(Arc::clone(&self.engine), &self.config);
        let worker_stop = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("recognizer".into())
            .spawn(move || worker.run(frames_rx, events, &worker_stop))
            .map_err(|e| CaptureError::Device(format!("could not start recognizer: {e}")))?;

        Ok(Box::new(LocalRecognition { mic, stop }))
    }
}

struct LocalRecognition {
    mic: MicrophoneStream,
    stop: Arc<AtomicBool>,
}

impl RecognitionStream for LocalRecognition {
    fn stop(self: Box<Self>) {
        self.stop.store(true, Ordering::SeqCst);
        // Closing the stream drops the frame sender, which ends the worker.
        self.mic.close();
    }
}

// ---------------------------------------------------------------------------
// UnsupportedRecognizer
// ---------------------------------------------------------------------------

/// Stand-in used when the binary was built without an on-device engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedRecognizer;

impl SpeechRecognizer for UnsupportedRecognizer {
    fn start(
        &self,
        _events: UnboundedSender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognitionStream>, CaptureError> {
        log::warn!("stt: inline recognition requested but no engine is built in");
        Err(CaptureError::PlatformUnsupported)
    }
}

// ---------------------------------------------------------------------------
// RecognitionWorker
// ---------------------------------------------------------------------------

pub(crate) struct RecognitionWorker {
    engine: Arc<dyn SttEngine>,
    endpointer: Endpointer,
    interim_samples: usize,
    last_interim_len: usize,
}

impl RecognitionWorker {
    pub(crate) fn new(engine: Arc<dyn SttEngine>, config: &CaptureConfig) -> Self {
        let interim_samples =
            (config.interim_interval().as_secs_f32() * TARGET_SAMPLE_RATE as f32) as usize;
        Self {
            engine,
            endpointer: Endpointer::new(config.vad_threshold, config.silence_timeout()),
            interim_samples: interim_samples.max(1),
            last_interim_len: 0,
        }
    }

    /// Consume frames until the utterance ends, the frame source closes, or
    /// `stop` is raised.  Sends at most one `Final`/`NoSpeech`/`Failed`.
    pub(crate) fn run(
        mut self,
        frames: Receiver<Vec<f32>>,
        events: UnboundedSender<RecognizerEvent>,
        stop: &AtomicBool,
    ) {
        while let Ok(frame) = frames.recv() {
            if stop.load(Ordering::SeqCst) {
                return;
            }

            if self.endpointer.push(&frame) == Endpoint::UtteranceEnded {
                let audio = self.endpointer.take_utterance();
                let event = match self.engine.transcribe(&audio) {
                    Ok(text) if !text.trim().is_empty() => {
                        RecognizerEvent::Final(text.trim().to_string())
                    }
                    Ok(_) | Err(SttError::AudioTooShort) => RecognizerEvent::NoSpeech,
                    Err(e) => RecognizerEvent::Failed(CaptureError::Device(e.to_string())),
                };
                if !stop.load(Ordering::SeqCst) {
                    let _ = events.send(event);
                }
                return;
            }

            self.maybe_interim(&events, stop);
        }
        log::debug!("stt: frame source closed");
    }

    fn maybe_interim(&mut self, events: &UnboundedSender<RecognizerEvent>, stop: &AtomicBool) {
        let len = self.endpointer.utterance().len();
        if !self.endpointer.heard_speech() || len < self.last_interim_len + self.interim_samples {
            return;
        }
        self.last_interim_len = len;

        match self.engine.transcribe(self.endpointer.utterance()) {
            Ok(text) if !text.trim().is_empty() && !stop.load(Ordering::SeqCst) => {
                let _ = events.send(RecognizerEvent::Interim(text.trim().to_string()));
            }
            Ok(_) => {}
            Err(e) => log::debug!("stt: interim pass failed: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
