//! Whisper-based speech-to-text transcription.
//!
//! This module provides a Whisper implementation of the Transcriber trait using whisper-rs.
//!
//! # Feature Gate
//!
//! This module requires the `whisper` feature to be enabled and cmake to be installed.
//! To build with Whisper support:
//!
//! ```bash
//! cargo build --features whisper
//! ```

use crate::error::{DubError, Result};
#[cfg(feature = "whisper")]
use crate::language;
use crate::stt::transcriber::Transcriber;
use std::path::{Path, PathBuf};

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for Whisper transcriber.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the Whisper model file
    pub model_path: PathBuf,
    /// Number of threads for inference (None = auto-detect)
    pub threads: Option<usize>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-medium.bin"),
            threads: None,
        }
    }
}

/// Whisper-based transcriber implementation.
///
/// The WhisperContext is wrapped in a Mutex to ensure thread safety.
#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

/// Whisper-based transcriber placeholder (without whisper feature).
///
/// This is a stub implementation that returns errors when used.
/// Enable the `whisper` feature to use real transcription.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperTranscriber {
    config: WhisperConfig,
    model_name: String,
}

/// Model name from the file stem: `ggml-base.en.bin` → `ggml-base.en`.
fn model_name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// English-only checkpoints carry a `.en` suffix.
fn is_english_only(model_name: &str) -> bool {
    model_name.ends_with(".en")
}

/// Convert i16 audio samples to f32 normalized to [-1.0, 1.0]
pub fn convert_audio(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Fails with `TranscriptionModelNotFound` when the model file is absent.
pub fn check_model_exists(model_path: &Path) -> Result<()> {
    if !model_path.exists() {
        return Err(DubError::TranscriptionModelNotFound {
            path: model_path.to_string_lossy().to_string(),
        });
    }
    Ok(())
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    /// Load a Whisper model.
    ///
    /// # Errors
    /// Returns `DubError::TranscriptionModelNotFound` if the model file doesn't exist
    /// Returns `DubError::Transcription` if model loading fails
    pub fn new(config: WhisperConfig) -> Result<Self> {
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        check_model_exists(&config.model_path)?;
        let model_name = model_name_from_path(&config.model_path);

        let mut context_params = WhisperContextParameters::default();
        context_params.flash_attn(true);
        let context = WhisperContext::new_with_params(
            config
                .model_path
                .to_str()
                .ok_or_else(|| DubError::Transcription {
                    message: "Invalid UTF-8 in model path".to_string(),
                })?,
            context_params,
        )
        .map_err(|e| DubError::Transcription {
            message: format!("Failed to load Whisper model: {}", e),
        })?;

        tracing::info!(model = %model_name, "Loaded Whisper model");

        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperTranscriber {
    /// Create a new Whisper transcriber (stub implementation).
    ///
    /// Only checks that the model file exists; transcription always fails.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        check_model_exists(&config.model_path)?;
        let model_name = model_name_from_path(&config.model_path);
        Ok(Self { config, model_name })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &[i16], language: &str) -> Result<String> {
        let audio_f32 = convert_audio(audio);
        let whisper_language = language::to_iso_639_1(language);

        let context = self.context.lock().map_err(|e| DubError::Transcription {
            message: format!("Failed to acquire context lock: {}", e),
        })?;

        let mut state = context
            .create_state()
            .map_err(|e| DubError::Transcription {
                message: format!("Failed to create Whisper state: {}", e),
            })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(whisper_language);

        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }

        // Disable printing to stdout/stderr
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio_f32)
            .map_err(|e| DubError::Transcription {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let mut transcription = String::new();
        for segment in state.as_iter() {
            transcription.push_str(&segment.to_string());
        }

        Ok(transcription.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn supported_languages(&self) -> Option<Vec<String>> {
        if is_english_only(&self.model_name) {
            return Some(vec!["eng".to_string()]);
        }
        let languages = (0..=whisper_rs::get_lang_max_id())
            .filter_map(whisper_rs::get_lang_str)
            .filter_map(language::from_iso_639_1)
            .map(str::to_string)
            .collect();
        Some(languages)
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, _audio: &[i16], _language: &str) -> Result<String> {
        Err(DubError::Transcription {
            message: concat!(
                "Whisper feature not enabled. This binary was built without speech recognition.\n",
                "To fix: cargo build --release --features whisper\n",
                "If build fails with cmake errors, install: sudo apt install cmake"
            )
            .to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn supported_languages(&self) -> Option<Vec<String>> {
        is_english_only(&self.model_name).then(|| vec!["eng".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_whisper_config_default() {
        let config = WhisperConfig::default();
        assert_eq!(config.model_path, PathBuf::from("models/ggml-medium.bin"));
        assert_eq!(config.threads, None);
    }

    #[test]
    fn test_whisper_transcriber_new_fails_for_missing_model() {
        let config = WhisperConfig {
            model_path: PathBuf::from("/nonexistent/model.bin"),
            threads: None,
        };

        match WhisperTranscriber::new(config) {
            Err(DubError::TranscriptionModelNotFound { path }) => {
                assert_eq!(path, "/nonexistent/model.bin");
            }
            _ => panic!("Expected TranscriptionModelNotFound error"),
        }
    }

    #[test]
    fn test_whisper_transcriber_model_name_extraction() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("ggml-base.en.bin");
        std::fs::write(&model_path, b"fake model data").unwrap();

        let result = WhisperTranscriber::new(WhisperConfig {
            model_path,
            threads: None,
        });

        // With whisper feature: fails because it's not a valid model file
        // Without whisper feature: succeeds (stub only checks file exists)
        #[cfg(feature = "whisper")]
        assert!(result.is_err(), "Should fail with invalid model file");

        #[cfg(not(feature = "whisper"))]
        {
            let transcriber = result.unwrap();
            assert_eq!(transcriber.model_name(), "ggml-base.en");
            assert!(!transcriber.is_ready());
            assert_eq!(
                transcriber.supported_languages(),
                Some(vec!["eng".to_string()])
            );
            assert!(transcriber.transcribe(&[0i16; 160], "eng").is_err());
        }
    }

    #[test]
    fn test_english_only_detection() {
        assert!(is_english_only("ggml-base.en"));
        assert!(!is_english_only("ggml-medium"));
    }

    #[test]
    fn test_convert_audio_i16_to_f32() {
        let samples = vec![0i16, 16384, -16384, 32767, -32768];
        let converted = convert_audio(&samples);

        assert_eq!(converted.len(), samples.len());
        assert_eq!(converted[0], 0.0);
        assert!((converted[1] - 0.5).abs() < 0.01);
        assert!((converted[2] + 0.5).abs() < 0.01);
        assert!((converted[3] - 0.999969).abs() < 0.01);
        assert_eq!(converted[4], -1.0);
    }

    #[test]
    fn test_whisper_transcriber_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<WhisperTranscriber>();
        assert_sync::<WhisperTranscriber>();
    }
}
