//! WAV clips: load, save, slice and resample mono 16-bit audio.

use crate::error::{DubError, Result};
use std::io::Read;
use std::path::Path;

/// Mono 16-bit PCM audio held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Silence of the given duration.
    pub fn silent(duration_secs: f64, sample_rate: u32) -> Self {
        let len = (duration_secs.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0; len], sample_rate)
    }

    /// Parse WAV data from any reader, downmixing to mono.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut wav_reader = hound::WavReader::new(reader).map_err(|e| DubError::Audio {
            message: format!("Failed to parse WAV file: {}", e),
        })?;

        let spec = wav_reader.spec();
        if spec.channels == 0 {
            return Err(DubError::Audio {
                message: "WAV file declares zero channels".to_string(),
            });
        }

        let raw_samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int if spec.bits_per_sample <= 16 => wav_reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Int => {
                let shift = spec.bits_per_sample.saturating_sub(16);
                wav_reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<std::result::Result<Vec<_>, _>>()
            }
            hound::SampleFormat::Float => wav_reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<std::result::Result<Vec<_>, _>>(),
        }
        .map_err(|e| DubError::Audio {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

        Ok(Self::new(
            downmix(&raw_samples, spec.channels),
            spec.sample_rate,
        ))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| DubError::Audio {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Write as 16-bit mono PCM.
    pub fn save(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    /// Number of samples covering `ms` milliseconds at this clip's rate.
    pub fn samples_for_ms(&self, ms: f64) -> usize {
        (ms * self.sample_rate as f64 / 1000.0).round().max(0.0) as usize
    }

    /// Copy of `[start_secs, end_secs)`, clamped to the clip.
    pub fn slice_secs(&self, start_secs: f64, end_secs: f64) -> AudioClip {
        let len = self.samples.len();
        let from = ((start_secs.max(0.0) * self.sample_rate as f64).round() as usize).min(len);
        let to = ((end_secs.max(0.0) * self.sample_rate as f64).round() as usize).clamp(from, len);
        AudioClip::new(self.samples[from..to].to_vec(), self.sample_rate)
    }

    /// Resample to `rate` with linear interpolation.
    pub fn resampled(&self, rate: u32) -> AudioClip {
        AudioClip::new(resample(&self.samples, self.sample_rate, rate), rate)
    }
}

/// Read only the duration of a WAV file from its header.
pub fn wav_duration_secs(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Ok(0.0);
    }
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Average interleaved channels into one.
fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_from_reader_mono_matches_exactly() {
        let input = vec![100i16, 200, 300, 400, 500];
        let clip = AudioClip::from_reader(Cursor::new(make_wav_data(44100, 1, &input))).unwrap();
        assert_eq!(clip.samples, input);
        assert_eq!(clip.sample_rate, 44100);
    }

    #[test]
    fn test_from_reader_stereo_downmixes_to_mono() {
        let stereo = vec![100i16, 200, 300, 400, -500, 500];
        let clip = AudioClip::from_reader(Cursor::new(make_wav_data(16000, 2, &stereo))).unwrap();
        assert_eq!(clip.samples, vec![150i16, 350, 0]);
    }

    #[test]
    fn test_invalid_wav_data_returns_audio_error() {
        let result = AudioClip::from_reader(Cursor::new(vec![0u8, 1, 2, 3, 4, 5]));
        match result {
            Err(DubError::Audio { message }) => {
                assert!(message.contains("Failed to parse WAV file"));
            }
            other => panic!("Expected Audio error, got {other:?}"),
        }
    }

    #[test]
    fn test_save_then_load_preserves_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.wav");
        let clip = AudioClip::new(vec![1, -2, 3, -4, 5], 22050);
        clip.save(&path).unwrap();

        assert_eq!(AudioClip::load(&path).unwrap(), clip);
        let duration = wav_duration_secs(&path).unwrap();
        assert!((duration - 5.0 / 22050.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_missing_file_is_audio_error() {
        let result = AudioClip::load(Path::new("/nonexistent/opendub/clip.wav"));
        assert!(matches!(result, Err(DubError::Audio { .. })));
    }

    #[test]
    fn test_duration_and_slice() {
        let clip = AudioClip::new((0..1000).map(|i| i as i16).collect(), 1000);
        assert_eq!(clip.duration_secs(), 1.0);
        assert_eq!(clip.duration_ms(), 1000.0);

        let slice = clip.slice_secs(0.25, 0.5);
        assert_eq!(slice.samples.len(), 250);
        assert_eq!(slice.samples[0], 250);

        // Out-of-range bounds clamp instead of panicking
        assert_eq!(clip.slice_secs(0.9, 5.0).samples.len(), 100);
        assert!(clip.slice_secs(2.0, 3.0).samples.is_empty());
    }

    #[test]
    fn test_silent_clip_has_requested_length() {
        let clip = AudioClip::silent(0.5, 16000);
        assert_eq!(clip.samples.len(), 8000);
        assert!(clip.samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_resample_identity_same_rate() {
        let samples = vec![100i16, 200, 300];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_upsample_interpolates() {
        let resampled = resample(&[0i16, 1000, 2000], 8000, 16000);
        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0);
        assert!(resampled[1] > 0 && resampled[1] < 1000);
        assert_eq!(resampled[2], 1000);
    }

    #[test]
    fn test_resample_handles_edge_cases() {
        assert!(resample(&[], 16000, 8000).is_empty());
        assert_eq!(resample(&[100i16], 16000, 8000), vec![100]);
    }

    #[test]
    fn test_resampled_clip_keeps_duration() {
        let clip = AudioClip::new(vec![500i16; 44100], 44100);
        let down = clip.resampled(16000);
        assert_eq!(down.sample_rate, 16000);
        assert!((down.duration_secs() - 1.0).abs() < 0.001);
    }
}
