//! Energy-based voice activity detection for live endpointing.
//!
//! [`Endpointer`] consumes 16 kHz mono audio as it arrives from the
//! microphone and decides when an utterance has ended.  Audio is split into
//! 30 ms frames (480 samples).  A frame is *voice* when its RMS amplitude
//! exceeds the threshold.  Once at least one voice frame has been heard, a
//! run of silent frames longer than the configured silence timeout marks the
//! utterance boundary.
//!
//! Leading silence is kept out of the utterance buffer; trailing silence is
//! trimmed when the utterance is taken.

use std::time::Duration;

use super::TARGET_SAMPLE_RATE;

/// 30 ms at 16 kHz.
const FRAME_SIZE: usize = 480;

/// Result of feeding audio into the [`Endpointer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Keep listening.
    Continue,
    /// Trailing silence after speech exceeded the timeout.
    UtteranceEnded,
}

// ---------------------------------------------------------------------------
// Endpointer
// ---------------------------------------------------------------------------

/// Streaming trailing-silence detector.
pub struct Endpointer {
    rms_threshold: f32,
    silence_frames: usize,
    pending: Vec<f32>,
    utterance: Vec<f32>,
    heard_speech: bool,
    trailing_silent: usize,
}

impl Endpointer {
    /// `rms_threshold` is typically `0.01` for a quiet room; raise it to
    /// `0.02`–`0.05` in noisy environments.
    pub fn new(rms_threshold: f32, silence_timeout: Duration) -> Self {
        let samples = silence_timeout.as_secs_f32() * TARGET_SAMPLE_RATE as f32;
        Self {
            rms_threshold,
            silence_frames: ((samples / FRAME_SIZE as f32).ceil() as usize).max(1),
            pending: Vec::with_capacity(FRAME_SIZE),
            utterance: Vec::new(),
            heard_speech: false,
            trailing_silent: 0,
        }
    }

    /// Feed newly captured samples.
    pub fn push(&mut self, samples: &[f32]) -> Endpoint {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / FRAME_SIZE * FRAME_SIZE;
        let frames: Vec<f32> = self.pending.drain(..complete).collect();

        for frame in frames.chunks_exact(FRAME_SIZE) {
            if is_voice_frame(frame, self.rms_threshold) {
                self.heard_speech = true;
                self.trailing_silent = 0;
                self.utterance.extend_from_slice(frame);
            } else if self.heard_speech {
                self.trailing_silent += 1;
                self.utterance.extend_from_slice(frame);
                if self.trailing_silent >= self.silence_frames {
                    return Endpoint::UtteranceEnded;
                }
            }
        }
        Endpoint::Continue
    }

    /// Whether any voice frame has been seen yet.
    pub fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    /// Audio of the utterance so far, leading silence excluded.
    pub fn utterance(&self) -> &[f32] {
        &self.utterance
    }

    /// Take the utterance with trailing silence trimmed and reset for the
    /// next one.
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let keep = self
            .utterance
            .len()
            .saturating_sub(self.trailing_silent * FRAME_SIZE);
        let mut out = std::mem::take(&mut self.utterance);
        out.truncate(keep);
        self.pending.clear();
        self.heard_speech = false;
        self.trailing_silent = 0;
        out
    }
}

fn is_voice_frame(frame: &[f32], threshold: f32) -> bool {
    if frame.is_empty() {
        return false;
    }
    let mean_sq = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    mean_sq.sqrt() > threshold
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(frames: usize) -> Vec<f32> {
        vec![0.0; frames * FRAME_SIZE]
    }

    fn voice(frames: usize) -> Vec<f32> {
        vec![0.5; frames * FRAME_SIZE]
    }

    /// 300 ms timeout = 10 frames.
    fn endpointer() -> Endpointer {
        Endpointer::new(0.01, Duration::from_millis(300))
    }

    #[test]
    fn silence_alone_never_ends() {
        let mut ep = endpointer();
        assert_eq!(ep.push(&silence(100)), Endpoint::Continue);
        assert!(!ep.heard_speech());
        assert!(ep.utterance().is_empty());
    }

    #[test]
    fn trailing_silence_ends_utterance() {
        let mut ep = endpointer();
        assert_eq!(ep.push(&voice(5)), Endpoint::Continue);
        assert_eq!(ep.push(&silence(9)), Endpoint::Continue);
        assert_eq!(ep.push(&silence(1)), Endpoint::UtteranceEnded);
    }

    #[test]
    fn speech_resets_silence_run() {
        let mut ep = endpointer();
        ep.push(&voice(2));
        ep.push(&silence(8));
        ep.push(&voice(1));
        assert_eq!(ep.push(&silence(9)), Endpoint::Continue);
    }

    #[test]
    fn leading_silence_excluded_trailing_trimmed() {
        let mut ep = endpointer();
        ep.push(&silence(4));
        ep.push(&voice(3));
        assert_eq!(ep.push(&silence(10)), Endpoint::UtteranceEnded);
        assert_eq!(ep.take_utterance().len(), 3 * FRAME_SIZE);
        assert!(!ep.heard_speech());
    }

    #[test]
    fn partial_frames_are_buffered() {
        let mut ep = endpointer();
        ep.push(&vec![0.5; FRAME_SIZE / 2]);
        assert!(!ep.heard_speech());
        ep.push(&vec![0.5; FRAME_SIZE / 2]);
        assert!(ep.heard_speech());
        assert_eq!(ep.utterance().len(), FRAME_SIZE);
    }

    #[test]
    fn tiny_timeout_is_at_least_one_frame() {
        let mut ep = Endpointer::new(0.01, Duration::ZERO);
        ep.push(&voice(1));
        assert_eq!(ep.push(&silence(1)), Endpoint::UtteranceEnded);
    }
}
