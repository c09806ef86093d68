//! Error types for opendub.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DubError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Input and environment checks
    #[error("Unsupported file format: {extension}")]
    UnsupportedFileFormat { extension: String },

    #[error("Required tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("Missing credential: {message}")]
    MissingCredential { message: String },

    #[error("Precondition failed: {message}")]
    PreconditionFailed { message: String },

    #[error("Language '{language}' is not supported by the speech recognition system")]
    UnsupportedSourceLanguage { language: String },

    #[error("Language pair '{source_language}-{target_language}' is not supported by the translation system")]
    UnsupportedLanguagePair {
        source_language: String,
        target_language: String,
    },

    #[error("Language '{language}' is not supported by the text to speech system")]
    UnsupportedTargetLanguage { language: String },

    // Audio errors
    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("Audio too short to speed up: {duration_secs:.2}s at {speed:.2}x with {chunk_size_ms}ms chunks")]
    AudioTooShort {
        duration_secs: f64,
        speed: f64,
        chunk_size_ms: u32,
    },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // Stage collaborator errors
    #[error("Segmentation failed: {message}")]
    Segmentation { message: String },

    #[error("Transcription model not found at {path}")]
    TranscriptionModelNotFound { path: String },

    #[error("Transcription error: {message}")]
    Transcription { message: String },

    #[error("Translation error: {message}")]
    Translation { message: String },

    #[error("Speech synthesis error: {message}")]
    Synthesis { message: String },

    #[error("TTS command configuration not found at {path}")]
    SynthesisConfigNotFound { path: String },

    #[error("Media tool failed: {message}")]
    Media { message: String },

    // Consistency errors (collaborator contract violations)
    #[error(
        "The utterance metadata must be of the same length as the text segments. Currently they are: {expected} and {actual}"
    )]
    SegmentCountMismatch { expected: usize, actual: usize },

    #[error("The length of utterances ({utterances}) and speaker info ({speakers}) must be the same")]
    SpeakerInfoMismatch { utterances: usize, speakers: usize },

    #[error("Stage {stage} returned {actual} utterances for {expected} inputs")]
    StageLengthMismatch {
        stage: String,
        expected: usize,
        actual: usize,
    },

    #[error("Stage {stage} dropped field '{field}' of utterance {index}")]
    FieldDropped {
        stage: String,
        index: usize,
        field: String,
    },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl DubError {
    /// Process exit code for this error.
    ///
    /// Codes 100 and above identify input/environment problems the user can fix;
    /// everything else exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            DubError::UnsupportedSourceLanguage { .. } => 100,
            DubError::UnsupportedLanguagePair { .. } => 101,
            DubError::UnsupportedTargetLanguage { .. } => 102,
            DubError::UnsupportedFileFormat { .. } => 103,
            DubError::MissingCredential { .. } => 104,
            DubError::ToolNotFound { .. } => 105,
            DubError::SynthesisConfigNotFound { .. } => 108,
            DubError::ConfigInvalidValue { key, .. } if key.starts_with("tts") => 109,
            DubError::ConfigInvalidValue { key, .. } if key == "translation.apertium_server" => {
                110
            }
            DubError::ConfigInvalidValue { key, .. } if key.starts_with("translation") => 111,
            _ => 1,
        }
    }

    /// True for errors that indicate a collaborator broke its contract.
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            DubError::SegmentCountMismatch { .. }
                | DubError::SpeakerInfoMismatch { .. }
                | DubError::StageLengthMismatch { .. }
                | DubError::FieldDropped { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, DubError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_segment_count_mismatch_display_has_counts() {
        let error = DubError::SegmentCountMismatch {
            expected: 3,
            actual: 2,
        };
        let msg = error.to_string();
        assert!(msg.contains("3 and 2"), "got: {msg}");
    }

    #[test]
    fn test_speaker_info_mismatch_display() {
        let error = DubError::SpeakerInfoMismatch {
            utterances: 4,
            speakers: 1,
        };
        assert_eq!(
            error.to_string(),
            "The length of utterances (4) and speaker info (1) must be the same"
        );
    }

    #[test]
    fn test_tool_not_found_display() {
        let error = DubError::ToolNotFound {
            tool: "ffprobe".to_string(),
        };
        assert_eq!(error.to_string(), "Required tool not found: ffprobe");
    }

    #[test]
    fn test_language_pair_display() {
        let error = DubError::UnsupportedLanguagePair {
            source_language: "eng".to_string(),
            target_language: "cat".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Language pair 'eng-cat' is not supported by the translation system"
        );
    }

    #[test]
    fn test_exit_codes_match_cli_contract() {
        assert_eq!(
            DubError::UnsupportedSourceLanguage {
                language: "xx".into()
            }
            .exit_code(),
            100
        );
        assert_eq!(
            DubError::UnsupportedLanguagePair {
                source_language: "a".into(),
                target_language: "b".into()
            }
            .exit_code(),
            101
        );
        assert_eq!(
            DubError::UnsupportedTargetLanguage {
                language: "xx".into()
            }
            .exit_code(),
            102
        );
        assert_eq!(
            DubError::UnsupportedFileFormat {
                extension: "avi".into()
            }
            .exit_code(),
            103
        );
        assert_eq!(
            DubError::ToolNotFound {
                tool: "ffmpeg".into()
            }
            .exit_code(),
            105
        );
        assert_eq!(
            DubError::SynthesisConfigNotFound {
                path: "tts.json".into()
            }
            .exit_code(),
            108
        );
        assert_eq!(
            DubError::ConfigInvalidValue {
                key: "translation.apertium_server".into(),
                message: "empty".into()
            }
            .exit_code(),
            110
        );
        assert_eq!(DubError::Other("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_consistency_errors_are_flagged() {
        assert!(
            DubError::SegmentCountMismatch {
                expected: 1,
                actual: 0
            }
            .is_consistency_error()
        );
        assert!(!DubError::Other("x".into()).is_consistency_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: DubError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: DubError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: DubError = io_error.into();
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<DubError>();
        assert_sync::<DubError>();
    }
}
