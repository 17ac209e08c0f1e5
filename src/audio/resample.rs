//! Channel mixing and rate conversion for microphone input.
//!
//! Devices deliver interleaved audio at their native rate (commonly 44.1 or
//! 48 kHz, often stereo).  Everything downstream works on 16 kHz mono, so
//! each callback buffer is downmixed and fed through one [`Resampler`] per
//! stream.  Linear interpolation is good enough for speech.

/// Average interleaved channels down to mono.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Streaming linear-interpolation resampler for mono audio.
///
/// Buffers arrive in whatever sizes the device picks, and most rate ratios
/// do not divide them evenly.  The read position and the last input sample
/// carry over between calls, so the output rate stays exact over a stream.
#[derive(Debug, Clone)]
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
    /// Position of the next output sample, in input samples, counted from
    /// `carry` when there is one.
    pos: f64,
    carry: Option<f32>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            pos: 0.0,
            carry: None,
        }
    }

    /// Convert the next buffer of the stream.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.from_rate == 0 || self.to_rate == 0 || input.is_empty() {
            return Vec::new();
        }
        if self.from_rate == self.to_rate {
            return input.to_vec();
        }

        let step = self.from_rate as f64 / self.to_rate as f64;
        let mut buf = Vec::with_capacity(input.len() + 1);
        buf.extend(self.carry);
        buf.extend_from_slice(input);
        let last = buf.len() - 1;

        let mut out = Vec::with_capacity((input.len() as f64 / step) as usize + 1);
        while self.pos < last as f64 {
            let idx = self.pos.floor() as usize;
            let frac = (self.pos - idx as f64) as f32;
            let (a, b) = (buf[idx], buf[idx + 1]);
            out.push(a + (b - a) * frac);
            self.pos += step;
        }

        self.pos -= last as f64;
        self.carry = Some(buf[last]);
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
