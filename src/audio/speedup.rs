//! Chunked, cross-faded time-domain speed-up.
//!
//! The clip is cut into windows of `chunk + remove` milliseconds. From every
//! window except the last, `remove` milliseconds are discarded; the cut is
//! hidden by cross-fading consecutive windows over `crossfade` milliseconds.
//! Pitch is unchanged, only the tempo moves.

use crate::audio::wav::AudioClip;
use crate::error::{DubError, Result};

/// Crossfade used for a given chunk size: half the chunk.
pub fn default_crossfade_ms(chunk_size_ms: u32) -> u32 {
    chunk_size_ms / 2
}

/// Window arithmetic for one speed-up, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedupPlan {
    /// Portion of every window that is kept.
    pub chunk_ms: u32,
    /// Portion of every window that is dropped.
    pub remove_ms: u32,
    /// Overlap between consecutive kept portions.
    pub crossfade_ms: u32,
}

impl SpeedupPlan {
    /// Returns `None` when `speed` does not shorten the audio.
    pub fn new(speed: f64, chunk_size_ms: u32, crossfade_ms: u32) -> Option<Self> {
        if speed.is_nan() || speed <= 1.0 || chunk_size_ms == 0 {
            return None;
        }
        let keep_ratio = 1.0 / speed;
        let (chunk_ms, remove_ms) = if speed < 2.0 {
            let remove = (chunk_size_ms as f64 * (1.0 - keep_ratio) / keep_ratio + 1e-9) as u32;
            (chunk_size_ms, remove)
        } else {
            let chunk = (keep_ratio * chunk_size_ms as f64 / (1.0 - keep_ratio) + 1e-9) as u32;
            (chunk, chunk_size_ms)
        };
        if remove_ms == 0 || chunk_ms == 0 {
            return None;
        }
        let crossfade_ms = crossfade_ms.min(remove_ms - 1);
        Some(Self {
            chunk_ms,
            remove_ms,
            crossfade_ms,
        })
    }

    /// Length of each window the clip is cut into.
    pub fn window_ms(&self) -> u32 {
        self.chunk_ms + self.remove_ms
    }
}

/// Speed `clip` up by `speed` (> 1.0).
///
/// Returns `None` when there is nothing to drop: a speed of 1.0 or less, or
/// one so close to 1.0 that less than a millisecond per chunk would go.
/// Fails with [`DubError::AudioTooShort`] when the clip does not span at
/// least two windows.
pub fn speedup(
    clip: &AudioClip,
    speed: f64,
    chunk_size_ms: u32,
    crossfade_ms: u32,
) -> Result<Option<AudioClip>> {
    let Some(plan) = SpeedupPlan::new(speed, chunk_size_ms, crossfade_ms) else {
        return Ok(None);
    };

    let window = clip.samples_for_ms(plan.window_ms() as f64).max(1);
    let windows: Vec<&[i16]> = clip.samples.chunks(window).collect();
    if windows.len() < 2 {
        return Err(DubError::AudioTooShort {
            duration_secs: clip.duration_secs(),
            speed,
            chunk_size_ms,
        });
    }

    let crossfade = clip.samples_for_ms(plan.crossfade_ms as f64);
    let trim = clip.samples_for_ms((plan.remove_ms - plan.crossfade_ms) as f64);

    let Some((last, body)) = windows.split_last() else {
        return Ok(None);
    };

    let mut out: Vec<i16> = Vec::with_capacity(clip.samples.len());
    for (index, window) in body.iter().enumerate() {
        let kept = &window[..window.len().saturating_sub(trim)];
        if index == 0 {
            out.extend_from_slice(kept);
        } else {
            append_with_crossfade(&mut out, kept, crossfade);
        }
    }
    out.extend_from_slice(last);

    Ok(Some(AudioClip::new(out, clip.sample_rate)))
}

/// Append `next` to `out`, overlapping the last `crossfade` samples with a
/// linear fade-out/fade-in.
fn append_with_crossfade(out: &mut Vec<i16>, next: &[i16], crossfade: usize) {
    let crossfade = crossfade.min(out.len()).min(next.len());
    if crossfade == 0 {
        out.extend_from_slice(next);
        return;
    }

    let base = out.len() - crossfade;
    for i in 0..crossfade {
        let fade_in = i as f32 / crossfade as f32;
        let fade_out = 1.0 - fade_in;
        let mixed = out[base + i] as f32 * fade_out + next[i] as f32 * fade_in;
        out[base + i] = mixed.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
    out.extend_from_slice(&next[crossfade..]);
}
