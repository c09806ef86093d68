//! opendub - Automatic video dubbing with open models
//!
//! Transcribes the speech of a video, translates it and re-voices it in the
//! target language, keeping every line within its original time slot.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod language;
pub mod media;
pub mod pipeline;
pub mod stt;
pub mod sys;
pub mod translation;
pub mod tts;
pub mod utterance;

// Collaborator traits
pub use media::{CommandExecutor, MediaTool, SourceSeparator, SystemCommandExecutor};
pub use stt::{Diarizer, GenderClassifier, Segmenter, Transcriber};
pub use translation::Translator;
pub use tts::Synthesizer;

// Pipeline
pub use pipeline::{Collaborators, DubReport, Dubber, RunContext, RunSettings, Stage};
pub use utterance::{SsmlGender, UtteranceRecord};

// Error handling
pub use error::{DubError, Result};

// Config
pub use config::Config;

// Stage error reporting (for embedding callers)
pub use pipeline::{ErrorReporter, StageError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.0+abc1234"` when git hash is available, `"0.3.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
