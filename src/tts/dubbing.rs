//! Synthesis stage.
//!
//! Rendering runs on a small worker pool; results are slotted back by index
//! so the record order never changes. Speed reconciliation only starts once
//! every utterance has been rendered, because its lookahead reads the whole
//! sequence.

use crate::audio::speedup::{default_crossfade_ms, speedup};
use crate::audio::wav::{AudioClip, wav_duration_secs};
use crate::defaults;
use crate::error::{DubError, Result};
use crate::tts::speed::{SpeedDecision, SpeedReconciler};
use crate::tts::{SynthesisRequest, Synthesizer};
use crate::utterance::UtteranceRecord;
use crossbeam_channel::unbounded;
use std::path::{Path, PathBuf};
use std::thread;

/// Settings of one synthesis run.
#[derive(Debug, Clone)]
pub struct DubbingSettings {
    pub target_language: String,
    pub output_dir: PathBuf,
    /// Concurrent synthesizer calls.
    pub workers: usize,
    /// Compress audio that would collide with the next utterance.
    pub adjust_speed: bool,
    pub reconciler: SpeedReconciler,
}

impl DubbingSettings {
    pub fn new(target_language: &str, output_dir: &Path) -> Self {
        Self {
            target_language: target_language.to_string(),
            output_dir: output_dir.to_path_buf(),
            workers: defaults::SYNTHESIS_WORKERS,
            adjust_speed: true,
            reconciler: SpeedReconciler::default(),
        }
    }
}

/// File the dub of `record` is written to.
pub fn dubbed_file_name(record: &UtteranceRecord) -> String {
    format!("dubbed_chunk_{:.3}_{:.3}.wav", record.start, record.end)
}

/// Synthesizes translated text and fits it to the original timing.
pub struct SpeechDubber<'a> {
    synthesizer: &'a dyn Synthesizer,
    settings: DubbingSettings,
}

impl<'a> SpeechDubber<'a> {
    pub fn new(synthesizer: &'a dyn Synthesizer, settings: DubbingSettings) -> Self {
        Self {
            synthesizer,
            settings,
        }
    }

    fn request_for(&self, record: &UtteranceRecord, speed: f64) -> SynthesisRequest {
        SynthesisRequest {
            text: record.translated_text.clone().unwrap_or_default(),
            voice: record
                .assigned_voice
                .clone()
                .unwrap_or_else(|| defaults::FALLBACK_VOICE.to_string()),
            language: self.settings.target_language.clone(),
            speed,
            pitch: record.pitch.unwrap_or(defaults::DEFAULT_PITCH),
            volume_gain_db: record
                .volume_gain_db
                .unwrap_or(defaults::DEFAULT_VOLUME_GAIN_DB),
            output_path: self.settings.output_dir.join(dubbed_file_name(record)),
        }
    }

    /// Run the synthesis stage over the full sequence.
    ///
    /// Records not marked for dubbing keep their original audio as
    /// `dubbed_path`.
    pub fn dub_utterances(&self, records: &[UtteranceRecord]) -> Result<Vec<UtteranceRecord>> {
        let mut records = records.to_vec();
        let mut jobs = Vec::new();

        for (index, record) in records.iter_mut().enumerate() {
            let has_text = record
                .translated_text
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            if record.for_dubbing && has_text {
                let speed = record.speed.unwrap_or(defaults::DEFAULT_SPEED);
                jobs.push((index, self.request_for(record, speed)));
            } else {
                if record.for_dubbing {
                    tracing::warn!(
                        start = record.start,
                        "Utterance marked for dubbing has no translation, keeping original audio"
                    );
                }
                record.dubbed_path = record.path.clone();
            }
        }

        std::fs::create_dir_all(&self.settings.output_dir)?;
        for (index, path) in self.render_all(jobs)? {
            records[index].dubbed_path = Some(path);
        }

        if self.settings.adjust_speed {
            self.reconcile(&mut records)?;
        }
        Ok(records)
    }

    /// Render every request on the worker pool, returning paths by index.
    fn render_all(&self, jobs: Vec<(usize, SynthesisRequest)>) -> Result<Vec<(usize, PathBuf)>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let workers = if self.synthesizer.supports_concurrent_requests() {
            self.settings.workers.clamp(1, jobs.len())
        } else {
            if self.settings.workers > 1 {
                tracing::debug!(
                    synthesizer = self.synthesizer.name(),
                    "Synthesizer cannot take overlapping requests, rendering one at a time"
                );
            }
            1
        };
        tracing::info!(
            utterances = jobs.len(),
            workers,
            synthesizer = self.synthesizer.name(),
            "Synthesizing utterances"
        );

        let (job_tx, job_rx) = unbounded::<(usize, SynthesisRequest)>();
        let (result_tx, result_rx) = unbounded::<(usize, Result<PathBuf>)>();
        let synthesizer = self.synthesizer;

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (index, request) in job_rx {
                        let rendered = synthesizer.synthesize(&request);
                        if result_tx.send((index, rendered)).is_err() {
                            break;
                        }
                    }
                });
            }
            for job in jobs {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });
        drop(result_tx);

        let mut rendered: Vec<(usize, Result<PathBuf>)> = result_rx.iter().collect();
        rendered.sort_by_key(|(index, _)| *index);
        rendered
            .into_iter()
            .map(|(index, result)| result.map(|path| (index, path)))
            .collect()
    }

    /// Sequential speed reconciliation over the fully rendered sequence.
    fn reconcile(&self, records: &mut [UtteranceRecord]) -> Result<()> {
        let reconciler = self.settings.reconciler;
        for index in 0..records.len() {
            if !records[index].for_dubbing {
                continue;
            }
            let Some(path) = records[index].dubbed_path.clone() else {
                continue;
            };
            if records[index].path.as_ref() == Some(&path) {
                continue;
            }

            let duration = wav_duration_secs(&path)?;
            let SpeedDecision::Compress { speed, factor, .. } =
                reconciler.decide(records, index, duration)
            else {
                continue;
            };

            tracing::debug!(
                start = records[index].start,
                duration,
                speed,
                "Compressing dubbed utterance"
            );

            if self.synthesizer.supports_variable_rate() {
                let request = self.request_for(&records[index], speed);
                let rendered = self.synthesizer.synthesize(&request)?;
                records[index].dubbed_path = Some(rendered);
                records[index].speed = Some(speed);
                continue;
            }

            let chunk_size = reconciler.chunk_size_ms;
            let clip = AudioClip::load(&path)?;
            match speedup(&clip, factor, chunk_size, default_crossfade_ms(chunk_size)) {
                Ok(Some(faster)) => {
                    faster.save(&path)?;
                    records[index].speed = Some(speed);
                    records[index].chunk_size = Some(chunk_size);
                }
                Ok(None) => {
                    tracing::debug!(
                        start = records[index].start,
                        factor,
                        "Speed-up too small for the chunk size, leaving audio unchanged"
                    );
                }
                Err(DubError::AudioTooShort { duration_secs, .. }) => {
                    tracing::warn!(
                        start = records[index].start,
                        duration_secs,
                        "Dubbed audio too short to speed up, leaving it unchanged"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
