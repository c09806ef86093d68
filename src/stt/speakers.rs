//! Speaker identity and voice gender.
//!
//! Diarization assigns a speaker id to every segment. Gender is classified
//! once per speaker from that speaker's longest utterance, then copied onto
//! every record of the speaker so all of them get the same voice.

use crate::audio::mix::calculate_rms;
use crate::audio::wav::AudioClip;
use crate::defaults;
use crate::error::{DubError, Result};
use crate::stt::segmenter::{RttmTurn, Segment, load_rttm};
use crate::utterance::{SsmlGender, UtteranceRecord};
use std::collections::HashMap;
use std::path::PathBuf;

/// Assigns a speaker identifier to each segment.
pub trait Diarizer: Send + Sync {
    fn name(&self) -> &str;

    /// Check the backend can be used at all. Runs before any stage.
    fn verify_access(&self) -> Result<()> {
        Ok(())
    }

    /// One speaker id per segment, in order.
    fn assign_speakers(&self, segments: &[Segment]) -> Result<Vec<String>>;
}

/// Everyone is `speaker_01`.
#[derive(Debug, Clone, Default)]
pub struct SingleSpeakerDiarizer;

impl Diarizer for SingleSpeakerDiarizer {
    fn name(&self) -> &str {
        "single"
    }

    fn assign_speakers(&self, segments: &[Segment]) -> Result<Vec<String>> {
        Ok(vec![defaults::DEFAULT_SPEAKER_ID.to_string(); segments.len()])
    }
}

/// Speakers from an RTTM file: each segment gets the speaker whose turns
/// overlap it most, or the nearest turn's speaker when none overlaps.
#[derive(Debug, Clone)]
pub struct RttmDiarizer {
    path: PathBuf,
}

impl RttmDiarizer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn speaker_for(segment: &Segment, turns: &[RttmTurn]) -> Option<String> {
    let mut overlap_by_speaker: HashMap<&str, f64> = HashMap::new();
    for turn in turns {
        let overlap = turn.segment.overlap(segment.start, segment.end);
        if overlap > 0.0 {
            *overlap_by_speaker.entry(turn.speaker.as_str()).or_default() += overlap;
        }
    }
    let best = overlap_by_speaker
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(speaker, _)| speaker.to_string());
    if best.is_some() {
        return best;
    }

    let distance = |turn: &RttmTurn| {
        if turn.segment.end <= segment.start {
            segment.start - turn.segment.end
        } else {
            turn.segment.start - segment.end
        }
    };
    turns
        .iter()
        .min_by(|a, b| distance(a).total_cmp(&distance(b)))
        .map(|turn| turn.speaker.clone())
}

impl Diarizer for RttmDiarizer {
    fn name(&self) -> &str {
        "rttm"
    }

    fn verify_access(&self) -> Result<()> {
        if !self.path.is_file() {
            return Err(DubError::PreconditionFailed {
                message: format!("RTTM file not found: {}", self.path.display()),
            });
        }
        Ok(())
    }

    fn assign_speakers(&self, segments: &[Segment]) -> Result<Vec<String>> {
        let turns = load_rttm(&self.path)?;
        if turns.is_empty() && !segments.is_empty() {
            return Err(DubError::Segmentation {
                message: format!("RTTM file {} has no speaker turns", self.path.display()),
            });
        }
        segments
            .iter()
            .map(|segment| {
                speaker_for(segment, &turns).ok_or_else(|| DubError::Segmentation {
                    message: "no speaker turn for segment".to_string(),
                })
            })
            .collect()
    }
}

/// Labels a voice sample Male or Female.
pub trait GenderClassifier: Send + Sync {
    fn classify(&self, sample: &AudioClip) -> Result<SsmlGender>;
}

/// Always returns the same label.
#[derive(Debug, Clone, Copy)]
pub struct FixedGenderClassifier(pub SsmlGender);

impl GenderClassifier for FixedGenderClassifier {
    fn classify(&self, _sample: &AudioClip) -> Result<SsmlGender> {
        Ok(self.0)
    }
}

/// Median fundamental frequency classifier.
///
/// F0 is estimated per voiced frame by normalised autocorrelation over
/// 60–400 Hz; a median below `split_hz` is Male.
#[derive(Debug, Clone, Copy)]
pub struct PitchGenderClassifier {
    pub split_hz: f32,
    pub voiced_threshold: f32,
}

impl Default for PitchGenderClassifier {
    fn default() -> Self {
        Self {
            split_hz: defaults::GENDER_PITCH_SPLIT_HZ,
            voiced_threshold: defaults::SEGMENT_THRESHOLD,
        }
    }
}

const PITCH_FRAME_MS: f64 = 40.0;
const MIN_F0_HZ: f64 = 60.0;
const MAX_F0_HZ: f64 = 400.0;
const MIN_CORRELATION: f64 = 0.5;

impl PitchGenderClassifier {
    /// F0 of one frame, or `None` if it is unvoiced.
    fn frame_pitch(&self, frame: &[i16], sample_rate: u32) -> Option<f64> {
        if calculate_rms(frame) <= self.voiced_threshold {
            return None;
        }
        let min_lag = (sample_rate as f64 / MAX_F0_HZ).floor() as usize;
        let max_lag = ((sample_rate as f64 / MIN_F0_HZ).floor() as usize).min(frame.len() / 2);
        if min_lag == 0 || min_lag >= max_lag {
            return None;
        }

        let x: Vec<f64> = frame.iter().map(|&s| s as f64).collect();
        let correlations: Vec<f64> = (min_lag..=max_lag)
            .map(|lag| {
                let (mut cross, mut head, mut tail) = (0.0, 0.0, 0.0);
                for i in 0..x.len() - lag {
                    cross += x[i] * x[i + lag];
                    head += x[i] * x[i];
                    tail += x[i + lag] * x[i + lag];
                }
                let norm = (head * tail).sqrt();
                if norm > 0.0 { cross / norm } else { 0.0 }
            })
            .collect();

        let best = correlations.iter().copied().fold(f64::MIN, f64::max);
        if best < MIN_CORRELATION {
            return None;
        }
        // First lag close to the best avoids picking a multiple of the period.
        let mut index = correlations.iter().position(|&c| c >= 0.9 * best)?;
        while index + 1 < correlations.len() && correlations[index + 1] > correlations[index] {
            index += 1;
        }
        Some(sample_rate as f64 / (min_lag + index) as f64)
    }

    /// Median F0 over the voiced frames of `sample`.
    pub fn median_pitch(&self, sample: &AudioClip) -> Option<f64> {
        let frame_len = sample.samples_for_ms(PITCH_FRAME_MS);
        if frame_len == 0 {
            return None;
        }
        let mut pitches: Vec<f64> = sample
            .samples
            .chunks_exact(frame_len)
            .filter_map(|frame| self.frame_pitch(frame, sample.sample_rate))
            .collect();
        if pitches.is_empty() {
            return None;
        }
        pitches.sort_by(f64::total_cmp);
        Some(pitches[pitches.len() / 2])
    }
}

impl GenderClassifier for PitchGenderClassifier {
    fn classify(&self, sample: &AudioClip) -> Result<SsmlGender> {
        let sample = if sample.sample_rate > defaults::STT_SAMPLE_RATE {
            sample.resampled(defaults::STT_SAMPLE_RATE)
        } else {
            sample.clone()
        };
        let pitch = self
            .median_pitch(&sample)
            .ok_or_else(|| DubError::Audio {
                message: "no voiced frames to classify".to_string(),
            })?;
        tracing::debug!(pitch_hz = pitch, "Estimated median pitch");
        if pitch < self.split_hz as f64 {
            Ok(SsmlGender::Male)
        } else {
            Ok(SsmlGender::Female)
        }
    }
}

/// Index of the longest record per speaker, in first-seen speaker order.
pub fn longest_sample_per_speaker(records: &[UtteranceRecord]) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut longest: HashMap<String, usize> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let Some(speaker) = &record.speaker_id else {
            continue;
        };
        match longest.get(speaker) {
            Some(&current)
                if records[current].reference_length() >= record.reference_length() => {}
            Some(_) => {
                longest.insert(speaker.clone(), index);
            }
            None => {
                order.push(speaker.clone());
                longest.insert(speaker.clone(), index);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|speaker| longest.get(&speaker).map(|&index| (speaker, index)))
        .collect()
}

/// Classify each speaker once, from their longest utterance capped at
/// `max_secs`. Speakers whose sample cannot be classified fall back to
/// Male with a warning.
pub fn classify_speakers(
    records: &[UtteranceRecord],
    classifier: &dyn GenderClassifier,
    max_secs: f64,
) -> Result<HashMap<String, SsmlGender>> {
    let mut genders = HashMap::new();
    for (speaker, index) in longest_sample_per_speaker(records) {
        let record = &records[index];
        let Some(path) = &record.path else {
            tracing::warn!(speaker = %speaker, "No audio chunk for speaker, assuming Male");
            genders.insert(speaker, SsmlGender::Male);
            continue;
        };
        let clip = AudioClip::load(path)?;
        let sample = clip.slice_secs(0.0, max_secs);
        let gender = match classifier.classify(&sample) {
            Ok(gender) => gender,
            Err(e) => {
                tracing::warn!(
                    speaker = %speaker,
                    error = %e,
                    "Gender classification failed, assuming Male"
                );
                SsmlGender::Male
            }
        };
        tracing::info!(speaker = %speaker, gender = %gender, "Classified speaker");
        genders.insert(speaker, gender);
    }
    Ok(genders)
}

/// Copy `(speaker_id, gender)` pairs onto the records, positionally.
pub fn add_speaker_info(
    records: &[UtteranceRecord],
    speaker_info: &[(String, SsmlGender)],
) -> Result<Vec<UtteranceRecord>> {
    if records.len() != speaker_info.len() {
        return Err(DubError::SpeakerInfoMismatch {
            utterances: records.len(),
            speakers: speaker_info.len(),
        });
    }
    Ok(records
        .iter()
        .zip(speaker_info)
        .map(|(record, (speaker, gender))| {
            let mut record = record.clone();
            record.speaker_id = Some(speaker.clone());
            record.ssml_gender = Some(*gender);
            record
        })
        .collect())
}

/// Speaker info for every record from a per-speaker gender map.
pub fn speaker_info_for(
    records: &[UtteranceRecord],
    genders: &HashMap<String, SsmlGender>,
) -> Vec<(String, SsmlGender)> {
    records
        .iter()
        .map(|record| {
            let speaker = record
                .speaker_id
                .clone()
                .unwrap_or_else(|| defaults::DEFAULT_SPEAKER_ID.to_string());
            let gender = genders
                .get(&speaker)
                .copied()
                .or(record.ssml_gender)
                .unwrap_or(SsmlGender::Male);
            (speaker, gender)
        })
        .collect()
}
