//! Level and mixing helpers for the final dubbed track.

use crate::audio::wav::AudioClip;
use crate::error::{DubError, Result};

/// Root mean square of the samples, normalised to 0.0..=1.0.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

/// Absolute peak as a fraction of full scale.
pub fn peak(samples: &[i16]) -> f64 {
    samples
        .iter()
        .map(|&s| (s as f64).abs() / i16::MAX as f64)
        .fold(0.0, f64::max)
}

pub fn db_to_amplitude(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Multiply every sample by `gain_db`, saturating at full scale.
pub fn apply_gain_db(clip: &AudioClip, gain_db: f64) -> AudioClip {
    if gain_db == 0.0 {
        return clip.clone();
    }
    let factor = db_to_amplitude(gain_db);
    let samples = clip
        .samples
        .iter()
        .map(|&s| saturate(s as f64 * factor))
        .collect();
    AudioClip::new(samples, clip.sample_rate)
}

/// Scale so the peak sits `headroom_db` below full scale.
///
/// Silent clips are returned unchanged.
pub fn normalize(clip: &AudioClip, headroom_db: f64) -> AudioClip {
    let peak = peak(&clip.samples);
    if peak == 0.0 {
        return clip.clone();
    }
    let target = db_to_amplitude(-headroom_db);
    let gain_db = 20.0 * (target / peak).log10();
    apply_gain_db(clip, gain_db)
}

/// Mix `overlay` into `base` starting at `position_secs`.
///
/// Samples past the end of `base` are dropped; `base` keeps its length.
pub fn overlay(base: &mut AudioClip, overlay: &AudioClip, position_secs: f64) -> Result<()> {
    if base.sample_rate != overlay.sample_rate {
        return Err(DubError::Audio {
            message: format!(
                "Cannot overlay {} Hz audio onto {} Hz track",
                overlay.sample_rate, base.sample_rate
            ),
        });
    }
    let offset = (position_secs.max(0.0) * base.sample_rate as f64).round() as usize;
    if offset >= base.samples.len() {
        return Ok(());
    }
    for (target, &sample) in base.samples[offset..].iter_mut().zip(&overlay.samples) {
        *target = saturate(*target as f64 + sample as f64);
    }
    Ok(())
}

/// Normalise both tracks, apply the per-track gains and mix them.
///
/// The result is as long as the shorter of the two tracks.
pub fn merge_tracks(
    background: &AudioClip,
    vocals: &AudioClip,
    background_gain_db: f64,
    vocals_gain_db: f64,
    headroom_db: f64,
) -> Result<AudioClip> {
    let vocals = if vocals.sample_rate != background.sample_rate {
        vocals.resampled(background.sample_rate)
    } else {
        vocals.clone()
    };

    let background = apply_gain_db(&normalize(background, headroom_db), background_gain_db);
    let vocals = apply_gain_db(&normalize(&vocals, headroom_db), vocals_gain_db);

    let len = background.samples.len().min(vocals.samples.len());
    let mut mixed = AudioClip::new(background.samples[..len].to_vec(), background.sample_rate);
    overlay(
        &mut mixed,
        &AudioClip::new(vocals.samples[..len].to_vec(), vocals.sample_rate),
        0.0,
    )?;
    Ok(mixed)
}

fn saturate(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}
