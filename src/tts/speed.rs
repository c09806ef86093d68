//! Speed reconciliation.
//!
//! After an utterance is rendered, its audio may run past the start of the
//! next utterance that will also be dubbed. Only then is it compressed, by
//! the factor `dubbed_duration / reference_length`, never beyond
//! `max_speed`. Overrunning into silence is left alone: stretching a line
//! into a pause sounds better than speeding it up.
//!
//! When no later utterance is dubbed, the boundary is the end of the media
//! if known, otherwise the utterance's own end.

use crate::defaults;
use crate::utterance::UtteranceRecord;

/// Outcome of reconciling one utterance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedDecision {
    /// Audio ends at or before the boundary, or is not longer than its window.
    Fits,
    /// Audio must be sped up.
    Compress {
        /// Absolute speed to record on the utterance.
        speed: f64,
        /// Factor relative to the speed the audio was rendered at.
        factor: f64,
        /// True when the required speed exceeded the maximum.
        clamped: bool,
    },
}

/// `dubbed_duration / reference_length`; above 1.0 means the dub runs long.
pub fn speed_ratio(reference_length: f64, dubbed_duration: f64) -> f64 {
    if reference_length <= 0.0 {
        return f64::INFINITY;
    }
    dubbed_duration / reference_length
}

/// Start of the first record after `index` that is marked for dubbing.
pub fn next_dubbed_start(records: &[UtteranceRecord], index: usize) -> Option<f64> {
    records
        .iter()
        .skip(index + 1)
        .find(|record| record.for_dubbing)
        .map(|record| record.start)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedReconciler {
    pub max_speed: f64,
    pub chunk_size_ms: u32,
    /// Total media length, the boundary for the last dubbed utterance.
    pub media_duration: Option<f64>,
}

impl Default for SpeedReconciler {
    fn default() -> Self {
        Self {
            max_speed: defaults::MAX_SPEED,
            chunk_size_ms: defaults::DEFAULT_CHUNK_SIZE_MS,
            media_duration: None,
        }
    }
}

impl SpeedReconciler {
    pub fn new(max_speed: f64, chunk_size_ms: u32) -> Self {
        Self {
            max_speed,
            chunk_size_ms,
            media_duration: None,
        }
    }

    pub fn with_media_duration(mut self, duration: Option<f64>) -> Self {
        self.media_duration = duration;
        self
    }

    /// Latest time the dub of `records[index]` may end.
    pub fn boundary(&self, records: &[UtteranceRecord], index: usize) -> f64 {
        next_dubbed_start(records, index)
            .or(self.media_duration)
            .unwrap_or(records[index].end)
    }

    /// Decide how to fit `records[index]`, whose rendered audio lasts
    /// `dubbed_duration` seconds at its current speed.
    pub fn decide(
        &self,
        records: &[UtteranceRecord],
        index: usize,
        dubbed_duration: f64,
    ) -> SpeedDecision {
        let record = &records[index];
        let boundary = self.boundary(records, index);
        if record.start + dubbed_duration <= boundary {
            return SpeedDecision::Fits;
        }

        let ratio = speed_ratio(record.reference_length(), dubbed_duration);
        if ratio <= 1.0 {
            return SpeedDecision::Fits;
        }

        let current = record.speed.unwrap_or(defaults::DEFAULT_SPEED).max(1.0);
        let required = current * ratio;
        let clamped = required > self.max_speed;
        let speed = required.min(self.max_speed);
        if clamped {
            tracing::info!(
                start = record.start,
                required,
                max = self.max_speed,
                "Utterance needs more speed than allowed, clamping"
            );
        }
        if speed <= current {
            return SpeedDecision::Fits;
        }

        SpeedDecision::Compress {
            speed,
            factor: speed / current,
            clamped,
        }
    }
}
