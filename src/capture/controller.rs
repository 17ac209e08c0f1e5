use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use super::{
    AudioClip, CaptureError, ClipRecorder, RecognitionStream, RecognizerEvent, Recording,
    SpeechRecognizer, Transcript,
};
use crate::audio::{ClipQuality, TARGET_SAMPLE_RATE};
use crate::config::{CaptureConfig, CaptureStrategy};
use crate::session::{lock_session, SharedSession};

// ---------------------------------------------------------------------------
// CaptureEvent
// ---------------------------------------------------------------------------

/// What an armed capture produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Inline only: provisional text, the capture stays armed.
    Interim(String),
    /// Inline only: the utterance finished.  The capture is released.
    Final(Transcript),
    /// RawClip only: a recording ready for transcription.  The capture is
    /// released.
    Clip(AudioClip),
    /// The capture ended without speech.  The capture is released.
    NoSpeech,
    /// The capture failed.  The capture is released.
    Failed(CaptureError),
}

// ---------------------------------------------------------------------------
// Internal handle
// ---------------------------------------------------------------------------

enum Handle {
    Inline {
        stream: Box<dyn RecognitionStream>,
        events: mpsc::UnboundedReceiver<RecognizerEvent>,
    },
    RawClip {
        recording: Box<dyn Recording>,
        failures: mpsc::UnboundedReceiver<CaptureError>,
    },
}

struct ActiveCapture {
    seq: u64,
    /// Listen limit.  Inline captures drop it once speech is heard; the
    /// recognizer's own endpointing ends the utterance from then on.
    deadline: Option<Instant>,
    handle: Handle,
}

enum Step {
    Recognizer(Option<RecognizerEvent>),
    DeviceFailed(CaptureError),
    TimedOut,
}

async fn expires(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// CaptureController
// ---------------------------------------------------------------------------

/// Owns the single capture handle and normalizes both strategies into
/// [`CaptureEvent`]s.
pub struct CaptureController {
    session: SharedSession,
    recognizer: Arc<dyn SpeechRecognizer>,
    recorder: Arc<dyn ClipRecorder>,
    quality: ClipQuality,
    max_listen: Duration,
    last_seq: u64,
    /// Sequence number whose transcript may still be acted on.
    authoritative: Option<u64>,
    active: Option<ActiveCapture>,
}

impl CaptureController {
    pub fn new(
        session: SharedSession,
        recognizer: Arc<dyn SpeechRecognizer>,
        recorder: Arc<dyn ClipRecorder>,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            session,
            recognizer,
            recorder,
            quality: ClipQuality::new(config.min_clip_secs, config.vad_threshold),
            max_listen: config.max_listen(),
            last_seq: 0,
            authoritative: None,
            active: None,
        }
    }

    /// Arm the microphone using the session's capture strategy.
    ///
    /// Returns the sequence number stamped on this capture.  Fails with
    /// [`CaptureError::CaptureInProgress`] if a capture is already armed; the
    /// existing capture is left untouched.
    pub fn start_capture(&mut self) -> Result<u64, CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::CaptureInProgress);
        }

        let strategy = lock_session(&self.session).capture_strategy;
        let handle = match strategy {
            CaptureStrategy::Inline => {
                let (tx, rx) = mpsc::unbounded_channel();
                let stream = self.recognizer.start(tx)?;
                Handle::Inline { stream, events: rx }
            }
            CaptureStrategy::RawClip => {
                let (tx, rx) = mpsc::unbounded_channel();
                Handle::RawClip {
                    recording: self.recorder.start(tx)?,
                    failures: rx,
                }
            }
        };

        self.last_seq += 1;
        let seq = self.last_seq;
        self.authoritative = Some(seq);
        self.active = Some(ActiveCapture {
            seq,
            deadline: Some(Instant::now() + self.max_listen),
            handle,
        });
        log::info!("capture: #{seq} armed ({strategy:?})");
        Ok(seq)
    }

    /// Finalize the current capture.  No-op when nothing is armed.
    ///
    /// Inline captures are released and any interim text is discarded.
    /// RawClip captures return the finished clip (or `NoSpeech` if the clip
    /// fails the quality gate).
    pub fn stop_capture(&mut self) -> Option<CaptureEvent> {
        let active = self.active.take()?;
        match active.handle {
            Handle::Inline { stream, .. } => {
                stream.stop();
                log::debug!("capture: #{} stopped, interim text discarded", active.seq);
                None
            }
            Handle::RawClip { recording, .. } => {
                log::debug!("capture: #{} stopped", active.seq);
                Some(self.finish_clip(active.seq, recording, false))
            }
        }
    }

    /// Release the capture without producing anything and invalidate every
    /// transcript issued so far.  Returns `true` if a capture was armed.
    pub fn cancel(&mut self) -> bool {
        self.authoritative = None;
        match self.release() {
            Some(seq) => {
                log::debug!("capture: #{seq} cancelled");
                true
            }
            None => false,
        }
    }

    /// Wait for the armed capture to produce something.
    ///
    /// Pends forever while nothing is armed.  Cancel-safe: dropping the future
    /// before it resolves loses nothing.
    pub async fn next_event(&mut self) -> CaptureEvent {
        let step = match self.active.as_mut() {
            None => return std::future::pending().await,
            Some(active) => {
                let deadline = active.deadline;
                match &mut active.handle {
                    Handle::Inline { events, .. } => tokio::select! {
                        ev = events.recv() => Step::Recognizer(ev),
                        _ = expires(deadline) => Step::TimedOut,
                    },
                    Handle::RawClip { failures, .. } => tokio::select! {
                        Some(e) = failures.recv() => Step::DeviceFailed(e),
                        _ = expires(deadline) => Step::TimedOut,
                    },
                }
            }
        };

        match step {
            Step::Recognizer(Some(RecognizerEvent::Interim(text))) => {
                if let Some(active) = self.active.as_mut() {
                    if active.deadline.take().is_some() {
                        log::debug!("capture: #{} heard speech, listen limit lifted", active.seq);
                    }
                }
                CaptureEvent::Interim(text)
            }
            Step::Recognizer(Some(RecognizerEvent::Final(text))) => {
                let seq = self.release().unwrap_or(self.last_seq);
                let text = text.trim();
                if text.is_empty() {
                    CaptureEvent::NoSpeech
                } else {
                    log::info!("capture: #{seq} final transcript ({} chars)", text.len());
                    CaptureEvent::Final(Transcript::new(text, seq))
                }
            }
            Step::Recognizer(Some(RecognizerEvent::NoSpeech)) => {
                self.release();
                CaptureEvent::NoSpeech
            }
            Step::Recognizer(Some(RecognizerEvent::Failed(e))) => {
                self.release();
                log::warn!("capture: recognizer failed: {e}");
                CaptureEvent::Failed(e)
            }
            Step::Recognizer(None) => {
                self.release();
                CaptureEvent::Failed(CaptureError::Device(
                    "speech recognizer stopped unexpectedly".into(),
                ))
            }
            Step::DeviceFailed(e) => {
                self.release();
                log::warn!("capture: input device failed: {e}");
                CaptureEvent::Failed(e)
            }
            Step::TimedOut => self.force_stop(),
        }
    }

    /// `true` only for the transcript of the most recent, non-cancelled
    /// capture.
    pub fn is_authoritative(&self, transcript: &Transcript) -> bool {
        self.is_current(transcript.seq())
    }

    /// Sequence-number form of [`is_authoritative`](Self::is_authoritative).
    pub fn is_current(&self, seq: u64) -> bool {
        self.authoritative == Some(seq)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Sequence number of the armed capture.
    pub fn active_seq(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.seq)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn release(&mut self) -> Option<u64> {
        let active = self.active.take()?;
        match active.handle {
            Handle::Inline { stream, .. } => stream.stop(),
            Handle::RawClip { recording, .. } => recording.abort(),
        }
        Some(active.seq)
    }

    fn force_stop(&mut self) -> CaptureEvent {
        let Some(active) = self.active.take() else {
            return CaptureEvent::NoSpeech;
        };
        log::info!(
            "capture: #{} reached the {}s listen limit",
            active.seq,
            self.max_listen.as_secs()
        );
        match active.handle {
            Handle::Inline { stream, .. } => {
                stream.stop();
                CaptureEvent::NoSpeech
            }
            Handle::RawClip { recording, .. } => self.finish_clip(active.seq, recording, true),
        }
    }

    fn finish_clip(&self, seq: u64, recording: Box<dyn Recording>, timed_out: bool) -> CaptureEvent {
        let samples = match recording.finish() {
            Ok(samples) => samples,
            Err(e) => {
                log::warn!("capture: #{seq} recording failed: {e}");
                return CaptureEvent::Failed(e);
            }
        };

        if let Err(reason) = self.quality.check(&samples) {
            log::info!("capture: #{seq} clip rejected: {reason}");
            return CaptureEvent::NoSpeech;
        }

        CaptureEvent::Clip(AudioClip {
            samples,
            sample_rate: TARGET_SAMPLE_RATE,
            seq,
            timed_out,
        })
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Recognizer whose event channel is driven by the test.
    #[derive(Default)]
    pub struct ScriptedRecognizer {
        pub fail_with: Mutex<Option<CaptureError>>,
        pub sender: Mutex<Option<mpsc::UnboundedSender<RecognizerEvent>>>,
        pub open: Arc<AtomicUsize>,
        pub starts: AtomicUsize,
    }

    impl ScriptedRecognizer {
        pub fn emit(&self, event: RecognizerEvent) {
            if let Some(tx) = self.sender.lock().unwrap().as_ref() {
                let _ = tx.send(event);
            }
        }

        pub fn open_streams(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }
    }

    struct ScriptedStream(Arc<AtomicUsize>);

    impl RecognitionStream for ScriptedStream {
        fn stop(self: Box<Self>) {}
    }

    impl Drop for ScriptedStream {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn start(
            &self,
            events: mpsc::UnboundedSender<RecognizerEvent>,
        ) -> Result<Box<dyn RecognitionStream>, CaptureError> {
            if let Some(e) = self.fail_with.lock().unwrap().clone() {
                return Err(e);
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.sender.lock().unwrap() = Some(events);
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedStream(Arc::clone(&self.open))))
        }
    }

    /// Recorder that hands back a fixed clip.
    pub struct FixedRecorder {
        pub samples: Mutex<Vec<f32>>,
        pub fail_with: Mutex<Option<CaptureError>>,
        /// Reported on the failure channel right after a successful start,
        /// the way a device that fails to open does.
        pub fail_after_start: Mutex<Option<CaptureError>>,
        pub open: Arc<AtomicUsize>,
        pub starts: AtomicUsize,
        pub aborts: Arc<AtomicUsize>,
    }

    impl FixedRecorder {
        pub fn new(samples: Vec<f32>) -> Self {
            Self {
                samples: Mutex::new(samples),
                fail_with: Mutex::new(None),
                fail_after_start: Mutex::new(None),
                open: Arc::new(AtomicUsize::new(0)),
                starts: AtomicUsize::new(0),
                aborts: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// One second of audible audio at 16 kHz.
        pub fn speech() -> Self {
            Self::new(vec![0.3; TARGET_SAMPLE_RATE as usize])
        }

        pub fn open_recordings(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }
    }

    struct FixedRecording {
        samples: Vec<f32>,
        open: Arc<AtomicUsize>,
        aborts: Arc<AtomicUsize>,
    }

    impl Recording for FixedRecording {
        fn finish(self: Box<Self>) -> Result<Vec<f32>, CaptureError> {
            Ok(self.samples.clone())
        }

        fn abort(self: Box<Self>) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Drop for FixedRecording {
        fn drop(&mut self) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ClipRecorder for FixedRecorder {
        fn start(
            &self,
            failures: mpsc::UnboundedSender<CaptureError>,
        ) -> Result<Box<dyn Recording>, CaptureError> {
            if let Some(e) = self.fail_with.lock().unwrap().clone() {
                return Err(e);
            }
            if let Some(e) = self.fail_after_start.lock().unwrap().clone() {
                let _ = failures.send(e);
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedRecording {
                samples: self.samples.lock().unwrap().clone(),
                open: Arc::clone(&self.open),
                aborts: Arc::clone(&self.aborts),
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
