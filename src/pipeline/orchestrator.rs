//! The dubbing run: environment checks, then every stage in order.
//!
//! Each stage receives the full utterance list and hands back a list of the
//! same length with fields only ever added. [`Dubber::run`] checks that
//! after every stage and aborts on the first fatal error.

use crate::audio::wav::AudioClip;
use crate::defaults;
use crate::error::{DubError, Result};
use crate::media::{self, MediaTool, NoSeparation, SourceSeparator, SplitMedia, Stems};
use crate::pipeline::context::RunContext;
use crate::pipeline::error::StageError;
use crate::pipeline::postprocess::{self, DubbedOutputs};
use crate::pipeline::stage::Stage;
use crate::pipeline::timing::{RunTimer, TimingReport};
use crate::stt::segmenter::{EnergySegmenter, Segmenter};
use crate::stt::speakers::{
    Diarizer, GenderClassifier, PitchGenderClassifier, SingleSpeakerDiarizer, add_speaker_info,
    classify_speakers, speaker_info_for,
};
use crate::stt::transcriber::Transcriber;
use crate::translation::{TranslationEngine, Translator, supports_pair};
use crate::tts::Synthesizer;
use crate::tts::dubbing::{DubbingSettings, SpeechDubber};
use crate::tts::speed::SpeedReconciler;
use crate::tts::voices::{apply_voice_properties, assign_voices};
use crate::utterance::{UtteranceRecord, check_no_field_loss, save_utterance_metadata};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// External systems a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub media: Arc<dyn MediaTool>,
    pub separator: Arc<dyn SourceSeparator>,
    pub segmenter: Arc<dyn Segmenter>,
    pub diarizer: Arc<dyn Diarizer>,
    pub gender_classifier: Arc<dyn GenderClassifier>,
    pub transcriber: Arc<dyn Transcriber>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Collaborators {
    /// No source separation, energy segmentation, a single speaker and
    /// pitch-based gender classification.
    pub fn new(
        media: Arc<dyn MediaTool>,
        transcriber: Arc<dyn Transcriber>,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            media,
            separator: Arc::new(NoSeparation),
            segmenter: Arc::new(EnergySegmenter::default()),
            diarizer: Arc::new(SingleSpeakerDiarizer),
            gender_classifier: Arc::new(PitchGenderClassifier::default()),
            transcriber,
            translator,
            synthesizer,
        }
    }

    pub fn with_separator(mut self, separator: Arc<dyn SourceSeparator>) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_diarizer(mut self, diarizer: Arc<dyn Diarizer>) -> Self {
        self.diarizer = diarizer;
        self
    }

    pub fn with_gender_classifier(mut self, classifier: Arc<dyn GenderClassifier>) -> Self {
        self.gender_classifier = classifier;
        self
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct DubReport {
    pub records: Vec<UtteranceRecord>,
    pub outputs: Option<DubbedOutputs>,
    pub metadata_path: Option<PathBuf>,
    pub timing: TimingReport,
}

/// True if `text` equals one of `phrases`, ignoring case and surrounding
/// punctuation or whitespace.
pub fn is_no_dubbing_phrase(text: &str, phrases: &[String]) -> bool {
    let normalize = |s: &str| {
        s.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .to_lowercase()
    };
    let text = normalize(text);
    !text.is_empty() && phrases.iter().any(|phrase| normalize(phrase) == text)
}

pub struct Dubber {
    context: RunContext,
    parts: Collaborators,
    timer: RunTimer,
    media_duration: Option<f64>,
    split: Option<SplitMedia>,
    stems: Option<Stems>,
    outputs: Option<DubbedOutputs>,
    metadata_path: Option<PathBuf>,
}

impl Dubber {
    pub fn new(context: RunContext, parts: Collaborators) -> Self {
        Self {
            context,
            parts,
            timer: RunTimer::new(),
            media_duration: None,
            split: None,
            stems: None,
            outputs: None,
            metadata_path: None,
        }
    }

    /// Input, tool, credential and language checks. Nothing is written.
    pub fn verify_environment(&self) -> Result<()> {
        let settings = &self.context.settings;
        media::check_input_file(&settings.input_file)?;
        self.parts.media.verify_tools()?;
        self.parts.separator.verify_tools()?;
        self.parts.diarizer.verify_access()?;

        if !self.parts.transcriber.is_ready() {
            return Err(DubError::PreconditionFailed {
                message: format!(
                    "transcriber '{}' is not ready",
                    self.parts.transcriber.model_name()
                ),
            });
        }
        if let Some(languages) = self.parts.transcriber.supported_languages()
            && !languages.contains(&settings.source_language)
        {
            return Err(DubError::UnsupportedSourceLanguage {
                language: settings.source_language.clone(),
            });
        }
        if !supports_pair(
            self.parts.translator.as_ref(),
            &settings.source_language,
            &settings.target_language,
        )? {
            return Err(DubError::UnsupportedLanguagePair {
                source_language: settings.source_language.clone(),
                target_language: settings.target_language.clone(),
            });
        }
        if !self
            .parts
            .synthesizer
            .languages()?
            .contains(&settings.target_language)
        {
            return Err(DubError::UnsupportedTargetLanguage {
                language: settings.target_language.clone(),
            });
        }
        Ok(())
    }

    /// Verify the environment, then run every stage in order.
    pub fn run(mut self) -> Result<DubReport> {
        let run_span = self.context.span().clone();
        let _run = run_span.enter();

        self.verify_environment()?;
        std::fs::create_dir_all(&self.context.settings.output_dir)?;

        let mut records = Vec::new();
        for stage in Stage::ALL {
            records = self.run_stage(stage, records)?;
        }

        let timing = self.timer.report();
        tracing::info!("Run finished\n{timing}");
        Ok(DubReport {
            records,
            outputs: self.outputs,
            metadata_path: self.metadata_path,
            timing,
        })
    }

    fn run_stage(
        &mut self,
        stage: Stage,
        records: Vec<UtteranceRecord>,
    ) -> Result<Vec<UtteranceRecord>> {
        let span = self.context.stage_span(stage);
        let _enter = span.enter();
        tracing::info!(utterances = records.len(), "Starting stage");
        let started = Instant::now();

        let output = match self.execute(stage, &records) {
            Ok(output) => output,
            Err(e) => {
                self.context.report(stage, &StageError::Fatal(e.to_string()));
                return Err(e);
            }
        };
        // Preprocessing is where records are created.
        if stage != Stage::Preprocessing {
            check_no_field_loss(stage.name(), &records, &output)?;
        }

        self.timer.record(stage, started.elapsed());
        Ok(output)
    }

    fn execute(
        &mut self,
        stage: Stage,
        records: &[UtteranceRecord],
    ) -> Result<Vec<UtteranceRecord>> {
        match stage {
            Stage::Preprocessing => self.preprocess(),
            Stage::Transcription => self.transcribe(records),
            Stage::Translation => self.translate(records),
            Stage::VoiceConfiguration => self.configure_voices(records),
            Stage::Synthesis => self.synthesize(records),
            Stage::Postprocessing => self.postprocess(records),
            Stage::Cleanup => self.cleanup(records),
        }
    }

    /// Split the media, separate vocals, detect speech and cut chunks.
    fn preprocess(&mut self) -> Result<Vec<UtteranceRecord>> {
        let settings = &self.context.settings;
        let output_dir = settings.output_dir.clone();
        let stem = media::normalized_stem(&settings.input_file);

        let split = self
            .parts
            .media
            .split(&settings.input_file, &output_dir, &stem)?;
        self.media_duration = match self.parts.media.duration_secs(&settings.input_file) {
            Ok(duration) if duration > 0.0 => Some(duration),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read media duration");
                None
            }
        };

        let stems = self.parts.separator.separate(&split.audio, &output_dir)?;
        let vocals = AudioClip::load(&stems.vocals)?;
        let segments = self.parts.segmenter.segment(&vocals)?;
        let speakers = self.parts.diarizer.assign_speakers(&segments)?;
        if speakers.len() != segments.len() {
            return Err(DubError::SpeakerInfoMismatch {
                utterances: segments.len(),
                speakers: speakers.len(),
            });
        }

        let limit = self
            .media_duration
            .unwrap_or(f64::INFINITY)
            .min(vocals.duration_secs());
        let mut records = Vec::with_capacity(segments.len());
        for (segment, speaker) in segments.iter().zip(speakers) {
            let start = segment.start.max(0.0);
            let end = segment.end.min(limit);
            if end <= start {
                tracing::debug!(start, end, "Dropping empty segment");
                continue;
            }
            let path = output_dir.join(format!("chunk_{start:.3}_{end:.3}.wav"));
            vocals.slice_secs(start, end).save(&path)?;
            let mut record = UtteranceRecord::new(start, end).with_path(path);
            record.speaker_id = Some(speaker);
            records.push(record);
        }

        tracing::info!(
            utterances = records.len(),
            segmenter = self.parts.segmenter.name(),
            diarizer = self.parts.diarizer.name(),
            "Detected speech"
        );
        self.split = Some(split);
        self.stems = Some(stems);
        Ok(records)
    }

    fn transcribe_chunk(&self, record: &UtteranceRecord) -> Result<String> {
        let path = record.path.as_deref().ok_or_else(|| DubError::Transcription {
            message: format!("no audio chunk for utterance at {:.3}s", record.start),
        })?;
        let clip = AudioClip::load(path)?.resampled(defaults::STT_SAMPLE_RATE);
        self.parts
            .transcriber
            .transcribe(&clip.samples, &self.context.settings.source_language)
    }

    /// Transcribe every chunk, then classify speakers.
    ///
    /// A chunk that fails is reported and kept with empty text, not dubbed.
    fn transcribe(&mut self, records: &[UtteranceRecord]) -> Result<Vec<UtteranceRecord>> {
        let phrases = &self.context.settings.no_dubbing_phrases;
        let mut transcribed = Vec::with_capacity(records.len());
        for record in records {
            let record = match self.transcribe_chunk(record) {
                Ok(text) => {
                    let text = text.trim().to_string();
                    let no_dub = is_no_dubbing_phrase(&text, phrases);
                    let mut record = record.clone().with_text(text);
                    if no_dub {
                        tracing::debug!(
                            start = record.start,
                            "No-dubbing phrase, keeping original audio"
                        );
                        record.for_dubbing = false;
                    }
                    record
                }
                Err(e) => {
                    self.context.report(
                        Stage::Transcription,
                        &StageError::Recoverable(format!(
                            "utterance at {:.3}s: {}",
                            record.start, e
                        )),
                    );
                    let mut record = record.clone().with_text("");
                    record.for_dubbing = false;
                    record
                }
            };
            transcribed.push(record);
        }

        let genders = classify_speakers(
            &transcribed,
            self.parts.gender_classifier.as_ref(),
            defaults::GENDER_SAMPLE_MAX_SECS,
        )?;
        add_speaker_info(&transcribed, &speaker_info_for(&transcribed, &genders))
    }

    fn translate(&mut self, records: &[UtteranceRecord]) -> Result<Vec<UtteranceRecord>> {
        let settings = &self.context.settings;
        TranslationEngine::new(self.parts.translator.as_ref()).translate_utterances(
            records,
            &settings.source_language,
            &settings.target_language,
        )
    }

    fn configure_voices(&mut self, records: &[UtteranceRecord]) -> Result<Vec<UtteranceRecord>> {
        let settings = &self.context.settings;
        let voices = self
            .parts
            .synthesizer
            .available_voices(&settings.target_language)?;
        let assigned = assign_voices(
            records,
            &voices,
            settings.target_language_region.as_deref(),
        );
        Ok(apply_voice_properties(&assigned))
    }

    fn synthesize(&mut self, records: &[UtteranceRecord]) -> Result<Vec<UtteranceRecord>> {
        let settings = &self.context.settings;
        let dubbing = DubbingSettings {
            target_language: settings.target_language.clone(),
            output_dir: settings.output_dir.clone(),
            workers: settings.synthesis_workers,
            adjust_speed: settings.adjust_speed,
            reconciler: SpeedReconciler::new(settings.max_speed, settings.chunk_size_ms)
                .with_media_duration(self.media_duration),
        };
        SpeechDubber::new(self.parts.synthesizer.as_ref(), dubbing).dub_utterances(records)
    }

    /// Mix the dub and save the metadata. A failed metadata save only warns.
    fn postprocess(&mut self, records: &[UtteranceRecord]) -> Result<Vec<UtteranceRecord>> {
        let settings = &self.context.settings;
        let stems = self.stems.as_ref().ok_or_else(|| {
            DubError::Other("postprocessing ran before preprocessing".to_string())
        })?;
        let video = self.split.as_ref().map(|split| split.video.as_path());
        let outputs =
            postprocess::assemble(records, stems, video, self.parts.media.as_ref(), settings)?;

        self.metadata_path = match save_utterance_metadata(
            &settings.output_dir,
            &settings.target_language,
            records,
        ) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to save utterance metadata");
                None
            }
        };
        self.outputs = Some(outputs);
        Ok(records.to_vec())
    }

    /// Remove chunk, dub and split files unless running in debug mode.
    fn cleanup(&mut self, records: &[UtteranceRecord]) -> Result<Vec<UtteranceRecord>> {
        if self.context.settings.debug {
            tracing::info!("Debug mode, keeping intermediate files");
            return Ok(records.to_vec());
        }
        let mut removed = postprocess::cleanup(records);

        let mut intermediates: Vec<PathBuf> = Vec::new();
        if let Some(split) = &self.split {
            intermediates.extend([split.audio.clone(), split.video.clone()]);
        }
        if let Some(stems) = &self.stems {
            intermediates.extend([stems.vocals.clone(), stems.background.clone()]);
        }
        for path in intermediates {
            if path.exists() && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        tracing::info!(removed, "Removed intermediate files");
        Ok(records.to_vec())
    }
}
