//! Pre-upload clip validation.
//!
//! [`ClipQuality`] checks a finalized 16 kHz mono `f32` RawClip recording
//! before it is uploaded for transcription:
//!
//! | Check | Description |
//! |-------|-------------|
//! | Duration | Clip must be at least `min_secs` long |
//! | Silence | At least one sample must exceed the amplitude threshold |
//!
//! A rejected clip is reported as "no speech" and never leaves the machine.
//! There is no upper bound here; the capture controller already stops
//! recording at the maximum listen duration.

use thiserror::Error;

use super::TARGET_SAMPLE_RATE;

// ---------------------------------------------------------------------------
// ClipRejection
// ---------------------------------------------------------------------------

/// Reason a clip failed validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClipRejection {
    #[error("clip too short: {got_secs:.2}s (minimum {min_secs:.2}s)")]
    TooShort { min_secs: f32, got_secs: f32 },

    #[error("clip too quiet: peak {amplitude:.4} (threshold {threshold:.4})")]
    TooQuiet { amplitude: f32, threshold: f32 },
}

// ---------------------------------------------------------------------------
// ClipQuality
// ---------------------------------------------------------------------------

/// Minimum duration and loudness a clip needs before it is worth uploading.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipQuality {
    /// Minimum duration in seconds.
    pub min_secs: f32,
    /// Minimum peak amplitude for the clip to count as non-silent.
    pub silence_threshold: f32,
}

impl Default for ClipQuality {
    fn default() -> Self {
        Self {
            min_secs: 0.3,
            silence_threshold: 0.01,
        }
    }
}

impl ClipQuality {
    pub fn new(min_secs: f32, silence_threshold: f32) -> Self {
        Self {
            min_secs,
            silence_threshold,
        }
    }

    /// Validate `audio` (16 kHz mono).  Duration is checked before loudness.
    pub fn check(&self, audio: &[f32]) -> Result<(), ClipRejection> {
        let got_secs = audio.len() as f32 / TARGET_SAMPLE_RATE as f32;
        if got_secs < self.min_secs {
            return Err(ClipRejection::TooShort {
                min_secs: self.min_secs,
                got_secs,
            });
        }

        let peak = audio.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);
        if peak < self.silence_threshold {
            return Err(ClipRejection::TooQuiet {
                amplitude: peak,
                threshold: self.silence_threshold,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(secs: f32, amplitude: f32) -> Vec<f32> {
        vec![amplitude; (secs * TARGET_SAMPLE_RATE as f32) as usize]
    }

    #[test]
    fn audible_clip_passes() {
        assert!(ClipQuality::default().check(&clip(1.0, 0.3)).is_ok());
    }

    #[test]
    fn short_clip_rejected() {
        let err = ClipQuality::new(0.5, 0.01).check(&clip(0.1, 0.3)).unwrap_err();
        assert!(matches!(err, ClipRejection::TooShort { .. }), "{err}");
    }

    #[test]
    fn empty_clip_is_too_short() {
        let err = ClipQuality::default().check(&[]).unwrap_err();
        assert!(matches!(err, ClipRejection::TooShort { .. }));
    }

    #[test]
    fn silent_clip_rejected() {
        let err = ClipQuality::default().check(&clip(1.0, 0.0)).unwrap_err();
        assert!(matches!(err, ClipRejection::TooQuiet { .. }), "{err}");
    }

    #[test]
    fn single_loud_sample_is_enough() {
        let mut audio = clip(1.0, 0.0);
        audio[4_000] = -0.2;
        assert!(ClipQuality::default().check(&audio).is_ok());
    }

    #[test]
    fn long_clip_is_not_rejected() {
        assert!(ClipQuality::default().check(&clip(45.0, 0.2)).is_ok());
    }

    #[test]
    fn rejection_display_is_informative() {
        let msg = ClipRejection::TooShort {
            min_secs: 0.3,
            got_secs: 0.1,
        }
        .to_string();
        assert!(msg.contains("0.10"), "{msg}");
        assert!(msg.contains("0.30"), "{msg}");
    }
}
