use std::io::Cursor;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// PCM layout of the audio a deployment produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Mono 16-bit PCM, which is what Piper voices emit.
    pub fn mono_16bit(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * (self.bits_per_sample as u64 / 8)
    }

    /// Playback length of `data_len` bytes of PCM in this format.
    pub fn duration_ms(&self, data_len: usize) -> u64 {
        match self.bytes_per_second() {
            0 => 0,
            bps => data_len as u64 * 1000 / bps,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono_16bit(22_050)
    }
}

// RIFF + fmt + data headers of a canonical PCM WAV file
const WAV_HEADER_LEN: usize = 44;

/// Encode f32 samples in [-1.0, 1.0] as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("failed to start WAV stream")?;
        const I16_MAX_F32: f32 = i16::MAX as f32;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16;
            writer
                .write_sample(v)
                .context("failed to write WAV sample")?;
        }
        writer.finalize().context("failed to finalize WAV header")?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wav_header_and_samples() {
        let samples = [0.0f32, 0.5, -0.5, 1.0, -1.0, 2.0];
        let bytes = encode_wav(&samples, 22_050).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), WAV_HEADER_LEN + samples.len() * 2);

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 22_050);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded[0], 0);
        assert_eq!(decoded[3], i16::MAX);
        assert_eq!(decoded[4], -i16::MAX);
        // out-of-range input is clamped
        assert_eq!(decoded[5], i16::MAX);
    }

    #[test]
    fn test_duration_ms() {
        let format = AudioFormat::mono_16bit(16_000);
        assert_eq!(format.duration_ms(32_000), 1000);
        assert_eq!(format.duration_ms(0), 0);
        let silent = AudioFormat {
            sample_rate: 0,
            ..format
        };
        assert_eq!(silent.duration_ms(100), 0);
    }
}
