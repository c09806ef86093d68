//! Speech segmentation: find the time spans that contain speech.
//!
//! Two backends:
//! - [`EnergySegmenter`] thresholds frame RMS, the same measure the mixer uses.
//! - [`RttmSegmenter`] reads spans from an RTTM diarization file.

use crate::audio::mix::calculate_rms;
use crate::audio::wav::AudioClip;
use crate::defaults;
use crate::error::{DubError, Result};
use std::path::{Path, PathBuf};

/// A detected speech span in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Length of the intersection with `[start, end)`.
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        (self.end.min(end) - self.start.max(start)).max(0.0)
    }
}

/// Produces the initial utterance spans for a track.
pub trait Segmenter: Send + Sync {
    fn segment(&self, audio: &AudioClip) -> Result<Vec<Segment>>;

    fn name(&self) -> &str;
}

/// Configuration for the RMS energy segmenter.
#[derive(Debug, Clone, Copy)]
pub struct EnergySegmenterConfig {
    /// RMS threshold for detecting speech (0.0 to 1.0).
    pub threshold: f32,
    pub frame_ms: u32,
    /// Silence needed before a segment is closed.
    pub min_silence_ms: u32,
    /// Shorter segments are dropped.
    pub min_speech_ms: u32,
    /// Added on both sides of every segment.
    pub padding_ms: u32,
}

impl Default for EnergySegmenterConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::SEGMENT_THRESHOLD,
            frame_ms: defaults::SEGMENT_FRAME_MS,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            padding_ms: defaults::SEGMENT_PADDING_MS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnergySegmenter {
    config: EnergySegmenterConfig,
}

impl EnergySegmenter {
    pub fn new(config: EnergySegmenterConfig) -> Self {
        Self { config }
    }

    /// Speech flag per frame.
    fn speech_frames(&self, audio: &AudioClip) -> (Vec<bool>, usize) {
        let frame_len = audio
            .samples_for_ms(self.config.frame_ms.max(1) as f64)
            .max(1);
        let flags = audio
            .samples
            .chunks(frame_len)
            .map(|frame| calculate_rms(frame) > self.config.threshold)
            .collect();
        (flags, frame_len)
    }
}

impl Segmenter for EnergySegmenter {
    fn segment(&self, audio: &AudioClip) -> Result<Vec<Segment>> {
        if audio.sample_rate == 0 {
            return Err(DubError::Segmentation {
                message: "audio has a sample rate of zero".to_string(),
            });
        }
        let (flags, frame_len) = self.speech_frames(audio);
        let frame_secs = frame_len as f64 / audio.sample_rate as f64;
        let silence_frames_to_close =
            (self.config.min_silence_ms as f64 / 1000.0 / frame_secs).ceil() as usize;

        let mut raw = Vec::new();
        let mut speech_start: Option<usize> = None;
        let mut last_speech = 0usize;
        for (index, &is_speech) in flags.iter().enumerate() {
            match (speech_start, is_speech) {
                (None, true) => {
                    speech_start = Some(index);
                    last_speech = index;
                }
                (Some(_), true) => last_speech = index,
                (Some(start), false) if index - last_speech >= silence_frames_to_close => {
                    raw.push((start, last_speech + 1));
                    speech_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = speech_start {
            raw.push((start, last_speech + 1));
        }

        let duration = audio.duration_secs();
        let min_speech = self.config.min_speech_ms as f64 / 1000.0;
        let padding = self.config.padding_ms as f64 / 1000.0;

        let padded: Vec<Segment> = raw
            .into_iter()
            .map(|(from, to)| {
                Segment::new(
                    from as f64 * frame_secs,
                    (to as f64 * frame_secs).min(duration),
                )
            })
            .filter(|segment| segment.duration() >= min_speech)
            .map(|segment| {
                Segment::new(
                    (segment.start - padding).max(0.0),
                    (segment.end + padding).min(duration),
                )
            })
            .collect();

        let segments = merge_overlapping(padded);
        tracing::debug!(segments = segments.len(), "Energy segmentation finished");
        Ok(segments)
    }

    fn name(&self) -> &str {
        "energy"
    }
}

/// Join segments that touch or overlap after padding.
fn merge_overlapping(segments: Vec<Segment>) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(previous) if segment.start <= previous.end => {
                previous.end = previous.end.max(segment.end);
            }
            _ => merged.push(segment),
        }
    }
    merged
}

/// One speaker turn from an RTTM file.
#[derive(Debug, Clone, PartialEq)]
pub struct RttmTurn {
    pub speaker: String,
    pub segment: Segment,
}

/// Parse `SPEAKER <file> <chan> <onset> <duration> <NA> <NA> <speaker> ...` lines.
///
/// Other record types, comments and blank lines are skipped. Turns are
/// returned sorted by onset.
pub fn parse_rttm(contents: &str) -> Result<Vec<RttmTurn>> {
    let mut turns = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() != Some(&"SPEAKER") {
            continue;
        }
        if fields.len() < 8 {
            return Err(DubError::Segmentation {
                message: format!("RTTM line {} has {} fields", line_no + 1, fields.len()),
            });
        }
        let parse = |value: &str, what: &str| -> Result<f64> {
            value.parse::<f64>().map_err(|_| DubError::Segmentation {
                message: format!("RTTM line {}: invalid {} '{}'", line_no + 1, what, value),
            })
        };
        let onset = parse(fields[3], "onset")?;
        let duration = parse(fields[4], "duration")?;
        if duration <= 0.0 {
            continue;
        }
        turns.push(RttmTurn {
            speaker: fields[7].to_string(),
            segment: Segment::new(onset, onset + duration),
        });
    }
    turns.sort_by(|a, b| a.segment.start.total_cmp(&b.segment.start));
    Ok(turns)
}

pub fn load_rttm(path: &Path) -> Result<Vec<RttmTurn>> {
    let contents = std::fs::read_to_string(path).map_err(|e| DubError::Segmentation {
        message: format!("Failed to read RTTM file {}: {}", path.display(), e),
    })?;
    parse_rttm(&contents)
}

/// Uses the turns of an RTTM file as utterance spans.
#[derive(Debug, Clone)]
pub struct RttmSegmenter {
    path: PathBuf,
}

impl RttmSegmenter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Segmenter for RttmSegmenter {
    fn segment(&self, audio: &AudioClip) -> Result<Vec<Segment>> {
        let duration = audio.duration_secs();
        let segments = load_rttm(&self.path)?
            .into_iter()
            .map(|turn| Segment::new(turn.segment.start, turn.segment.end.min(duration)))
            .filter(|segment| segment.end > segment.start)
            .collect();
        Ok(segments)
    }

    fn name(&self) -> &str {
        "rttm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const RATE: u32 = 1000;

    /// Build a clip from (seconds, loud) runs.
    fn clip(runs: &[(f64, bool)]) -> AudioClip {
        let mut samples = Vec::new();
        for &(secs, loud) in runs {
            let len = (secs * RATE as f64) as usize;
            let value = if loud { 10000 } else { 0 };
            samples.extend(std::iter::repeat_n(value, len));
        }
        AudioClip::new(samples, RATE)
    }

    fn unpadded() -> EnergySegmenter {
        EnergySegmenter::new(EnergySegmenterConfig {
            threshold: 0.02,
            frame_ms: 10,
            min_silence_ms: 200,
            min_speech_ms: 100,
            padding_ms: 0,
        })
    }

    #[test]
    fn test_finds_two_separate_utterances() {
        let audio = clip(&[(0.5, false), (1.0, true), (1.0, false), (0.5, true), (0.5, false)]);
        let segments = unpadded().segment(&audio).unwrap();
        assert_eq!(segments.len(), 2);
        assert!((segments[0].start - 0.5).abs() < 1e-9);
        assert!((segments[0].end - 1.5).abs() < 1e-9);
        assert!((segments[1].start - 2.5).abs() < 1e-9);
        assert!((segments[1].end - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_pause_does_not_split() {
        let audio = clip(&[(0.5, true), (0.1, false), (0.5, true)]);
        let segments = unpadded().segment(&audio).unwrap();
        assert_eq!(segments.len(), 1);
        assert!((segments[0].end - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_drops_blips_shorter_than_min_speech() {
        let audio = clip(&[(0.5, false), (0.05, true), (0.5, false)]);
        assert!(unpadded().segment(&audio).unwrap().is_empty());
    }

    #[test]
    fn test_silence_yields_no_segments() {
        let audio = clip(&[(2.0, false)]);
        assert!(unpadded().segment(&audio).unwrap().is_empty());
    }

    #[test]
    fn test_padding_is_clamped_and_merges_neighbours() {
        let segmenter = EnergySegmenter::new(EnergySegmenterConfig {
            padding_ms: 200,
            ..unpadded().config
        });
        let audio = clip(&[(0.1, false), (0.5, true), (0.3, false), (0.5, true)]);
        let segments = segmenter.segment(&audio).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0.0);
        assert!((segments[0].end - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_of_segments() {
        let segment = Segment::new(1.0, 3.0);
        assert_eq!(segment.overlap(2.0, 5.0), 1.0);
        assert_eq!(segment.overlap(4.0, 5.0), 0.0);
    }

    #[test]
    fn test_parses_rttm_turns_sorted() {
        let contents = "\
; comment
SPEAKER video 1 4.50 1.25 <NA> <NA> spk_1 <NA> <NA>
SPEAKER video 1 0.00 2.00 <NA> <NA> spk_0 <NA> <NA>
SPKR-INFO video 1 <NA> <NA> <NA> unknown spk_0 <NA> <NA>
";
        let turns = parse_rttm(contents).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, "spk_0");
        assert_eq!(turns[1].segment, Segment::new(4.5, 5.75));
    }

    #[test]
    fn test_rejects_malformed_rttm() {
        assert!(parse_rttm("SPEAKER video 1 abc 1.0 <NA> <NA> spk").is_err());
        assert!(parse_rttm("SPEAKER video 1").is_err());
    }

    #[test]
    fn test_rttm_segmenter_clamps_to_audio() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "SPEAKER v 1 0.5 1.0 <NA> <NA> a <NA> <NA>").unwrap();
        writeln!(file, "SPEAKER v 1 1.8 5.0 <NA> <NA> b <NA> <NA>").unwrap();
        writeln!(file, "SPEAKER v 1 9.0 1.0 <NA> <NA> b <NA> <NA>").unwrap();

        let segmenter = RttmSegmenter::new(file.path());
        let segments = segmenter.segment(&clip(&[(2.0, false)])).unwrap();
        assert_eq!(segments, vec![Segment::new(0.5, 1.5), Segment::new(1.8, 2.0)]);
        assert_eq!(segmenter.name(), "rttm");
    }
}
