//! In-memory WAV encoding for clip uploads.

use std::io::Cursor;

use super::TARGET_SAMPLE_RATE;

/// Encode 16 kHz mono `f32` samples as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32]) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_mono_16k_pcm() {
        let bytes = encode_wav(&[0.0, 0.5, -0.5, 1.0]).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let bytes = encode_wav(&[2.0, -2.0]).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn empty_clip_is_header_only() {
        let bytes = encode_wav(&[]).unwrap();
        assert_eq!(bytes.len(), 44);
    }
}
