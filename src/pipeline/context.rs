//! Run-scoped state handed to every stage.

use crate::defaults;
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use crate::pipeline::stage::Stage;
use std::path::PathBuf;
use std::sync::Arc;

/// Settings of a single dubbing run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub input_file: PathBuf,
    /// ISO 639-3.
    pub source_language: String,
    /// ISO 639-3.
    pub target_language: String,
    pub target_language_region: Option<String>,
    pub output_dir: PathBuf,
    /// Keep intermediate files.
    pub debug: bool,
    /// Transcripts equal to one of these are kept but not dubbed.
    pub no_dubbing_phrases: Vec<String>,
    pub synthesis_workers: usize,
    pub adjust_speed: bool,
    pub max_speed: f64,
    pub chunk_size_ms: u32,
    pub vocals_volume_adjustment: f64,
    pub background_volume_adjustment: f64,
}

impl RunSettings {
    pub fn new(
        input_file: impl Into<PathBuf>,
        source_language: &str,
        target_language: &str,
    ) -> Self {
        Self {
            input_file: input_file.into(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            target_language_region: None,
            output_dir: PathBuf::from(defaults::OUTPUT_DIRECTORY),
            debug: false,
            no_dubbing_phrases: Vec::new(),
            synthesis_workers: defaults::SYNTHESIS_WORKERS,
            adjust_speed: true,
            max_speed: defaults::MAX_SPEED,
            chunk_size_ms: defaults::DEFAULT_CHUNK_SIZE_MS,
            vocals_volume_adjustment: defaults::VOCALS_VOLUME_ADJUSTMENT,
            background_volume_adjustment: defaults::BACKGROUND_VOLUME_ADJUSTMENT,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }
}

/// Explicit context passed through the orchestrator instead of global state.
pub struct RunContext {
    pub settings: RunSettings,
    span: tracing::Span,
    reporter: Arc<dyn ErrorReporter>,
}

impl RunContext {
    pub fn new(settings: RunSettings) -> Self {
        let span = tracing::info_span!(
            "dub",
            input = %settings.input_file.display(),
            source = %settings.source_language,
            target = %settings.target_language,
        );
        Self {
            settings,
            span,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Child span of the run span for one stage.
    pub fn stage_span(&self, stage: Stage) -> tracing::Span {
        tracing::info_span!(parent: &self.span, "stage", name = stage.name())
    }

    pub fn report(&self, stage: Stage, error: &StageError) {
        self.reporter.report(stage.name(), error);
    }
}
