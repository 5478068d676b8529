//! WAV export of captured takes using hound
//!
//! Takes are peak-normalized and written as 16-bit signed PCM.

use super::AudioError;
use hound::{WavSpec, WavWriter};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Scale samples so the loudest one lands on `i16::MAX`
///
/// An all-zero buffer stays silent.
pub fn normalize_to_i16(samples: &[f32]) -> Vec<i16> {
    let peak = samples.iter().fold(0.0f64, |peak, &s| peak.max((s as f64).abs()));
    if peak == 0.0 {
        return vec![0; samples.len()];
    }
    samples
        .iter()
        .map(|&s| (s as f64 / peak * i16::MAX as f64).round() as i16)
        .collect()
}

/// Writes takes to disk
pub struct WavRecorder {
    spec: WavSpec,
    recordings_dir: PathBuf,
}

impl WavRecorder {
    /// Create a writer for takes captured at `sample_rate` with `channels`
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let recordings_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("couchguitar")
            .join("recordings");

        Self {
            spec,
            recordings_dir,
        }
    }

    /// Set the recordings directory
    pub fn set_recordings_dir(&mut self, dir: impl AsRef<Path>) {
        self.recordings_dir = dir.as_ref().to_path_buf();
    }

    /// Generate a unique path for a new take inside the recordings directory
    pub fn generate_filename(&self) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        self.recordings_dir
            .join(format!("recording_{}_{}.wav", timestamp, &uuid[..8]))
    }

    /// Normalize and write `samples` to `path`
    pub fn save(&self, samples: &[f32], path: &Path) -> Result<(), AudioError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let mut writer = WavWriter::new(BufWriter::new(file), self.spec)?;
        for sample in normalize_to_i16(samples) {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;

        info!("Saved {} samples to {}", samples.len(), path.display());
        Ok(())
    }

    /// Write `samples` under a generated name and return the path used
    pub fn save_generated(&self, samples: &[f32]) -> Result<PathBuf, AudioError> {
        let path = self.generate_filename();
        self.save(samples, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_scales_peak_to_full_range() {
        let out = normalize_to_i16(&[0.25, -0.5, 0.1]);
        assert_eq!(out, vec![16384, -32767, 6553]);
    }

    #[test]
    fn test_normalize_silence_is_guarded() {
        assert_eq!(normalize_to_i16(&[0.0, 0.0, -0.0]), vec![0, 0, 0]);
        assert!(normalize_to_i16(&[]).is_empty());
    }

    #[test]
    fn test_save_writes_normalized_16_bit_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let samples = [0.02f32, -0.04, 0.01, 0.03];

        WavRecorder::new(44100, 2).save(&samples, &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);

        let written: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        let peak = 0.04f32 as f64;
        let expected: Vec<i16> = samples
            .iter()
            .map(|&s| (s as f64 / peak * 32767.0).round() as i16)
            .collect();
        assert_eq!(written, expected);
    }

    #[test]
    fn test_generated_names_live_in_recordings_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = WavRecorder::new(44100, 2);
        recorder.set_recordings_dir(dir.path().join("takes"));

        let path = recorder.save_generated(&[0.5, -0.5]).unwrap();
        assert!(path.starts_with(dir.path().join("takes")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("recording_"));
        assert!(name.ends_with(".wav"));
        assert!(path.exists());
    }
}
