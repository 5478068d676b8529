//! Backing track decoding
//!
//! Reads a WAV file into interleaved `f32` samples that the output sink can
//! slice at any frame offset.

use super::AudioError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A decoded WAV file held in memory
#[derive(Clone, Debug)]
pub struct PcmBuffer {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
    sample_width: u16,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32, sample_width: u16) -> Self {
        Self {
            samples: samples.into(),
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
            sample_width,
        }
    }

    /// Decode a WAV file
    ///
    /// Integer samples are scaled into [-1.0, 1.0) by their bit depth.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let reader = hound::WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                if spec.bits_per_sample != 32 {
                    return Err(AudioError::UnsupportedFormat(format!(
                        "{}-bit float",
                        spec.bits_per_sample
                    )));
                }
                reader.into_samples::<f32>().collect::<Result<_, _>>()?
            }
            hound::SampleFormat::Int => {
                if !(8..=32).contains(&spec.bits_per_sample) {
                    return Err(AudioError::UnsupportedFormat(format!(
                        "{}-bit integer",
                        spec.bits_per_sample
                    )));
                }
                let max_value = (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_value))
                    .collect::<Result<_, _>>()?
            }
        };

        Ok(Self::new(
            samples,
            spec.channels,
            spec.sample_rate,
            spec.bits_per_sample.div_ceil(8),
        ))
    }

    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Bytes per sample in the file this buffer came from
    pub fn sample_width(&self) -> u16 {
        self.sample_width
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Interleaved sample index for a time offset, clamped to the end
    pub fn sample_offset(&self, position: Duration) -> usize {
        let frame = (position.as_secs_f64() * self.sample_rate as f64) as usize;
        frame.min(self.frames()) * self.channels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_i16(path: &Path, channels: u16, rate: u32, samples: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_open_reads_format_and_scales_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_i16(&path, 2, 8000, &[16384, -16384, 0, i16::MIN]);

        let buffer = PcmBuffer::open(&path).unwrap();
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.sample_rate(), 8000);
        assert_eq!(buffer.sample_width(), 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(&buffer.samples()[..], &[0.5, -0.5, 0.0, -1.0]);
    }

    #[test]
    fn test_open_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PcmBuffer::open(dir.path().join("nope.wav")).is_err());
    }

    #[test]
    fn test_sample_offset_is_frame_aligned_and_clamped() {
        let buffer = PcmBuffer::new(vec![0.0; 2000], 2, 1000, 2);
        assert_eq!(buffer.duration(), Duration::from_secs(1));
        assert_eq!(buffer.sample_offset(Duration::from_millis(250)), 500);
        assert_eq!(buffer.sample_offset(Duration::from_secs(5)), 2000);
    }
}
