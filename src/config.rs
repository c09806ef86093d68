use crate::defaults;
use crate::error::{DubError, Result};
use crate::language;
use crate::pipeline::context::RunSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub dubbing: DubbingConfig,
    pub segmentation: SegmentationConfig,
    pub stt: SttConfig,
    pub translation: TranslationConfig,
    pub tts: TtsConfig,
    pub speed: SpeedConfig,
    pub mix: MixConfig,
    pub separation: SeparationConfig,
}

/// What to dub and where to put it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DubbingConfig {
    /// ISO 639-3 code of the spoken language.
    pub source_language: String,
    /// ISO 639-3 code to dub into.
    pub target_language: String,
    pub target_language_region: Option<String>,
    pub output_directory: PathBuf,
    /// Keep intermediate files.
    pub debug: bool,
    pub no_dubbing_phrases: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationBackend {
    Energy,
    Rttm,
}

/// Speech detection and speaker turns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentationConfig {
    pub backend: SegmentationBackend,
    /// Speaker turns; also used for diarization when set.
    pub rttm_file: Option<PathBuf>,
    pub threshold: f32,
    pub min_silence_ms: u32,
    pub min_speech_ms: u32,
    pub padding_ms: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SttBackend {
    Whisper,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub backend: SttBackend,
    /// Path to a ggml model file.
    pub model: PathBuf,
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranslationBackend {
    Apertium,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub backend: TranslationBackend,
    pub apertium_server: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    Cli,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub backend: TtsBackend,
    /// JSON file describing the TTS command and its voices.
    pub cli_config: Option<PathBuf>,
    pub device: String,
    /// Concurrent synthesizer calls.
    pub workers: usize,
}

/// Speed reconciliation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeedConfig {
    pub adjust: bool,
    pub max_speed: f64,
    pub chunk_size_ms: u32,
}

/// Gains applied when mixing, in dB
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixConfig {
    pub vocals_volume_adjustment: f64,
    pub background_volume_adjustment: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeparationBackend {
    None,
    Demucs,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeparationConfig {
    pub backend: SeparationBackend,
    pub device: String,
}

impl Default for DubbingConfig {
    fn default() -> Self {
        Self {
            source_language: "eng".to_string(),
            target_language: "cat".to_string(),
            target_language_region: None,
            output_directory: PathBuf::from(defaults::OUTPUT_DIRECTORY),
            debug: false,
            no_dubbing_phrases: Vec::new(),
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            backend: SegmentationBackend::Energy,
            rttm_file: None,
            threshold: defaults::SEGMENT_THRESHOLD,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            padding_ms: defaults::SEGMENT_PADDING_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: SttBackend::Whisper,
            model: PathBuf::from("models/ggml-medium.bin"),
            threads: None,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: TranslationBackend::Apertium,
            apertium_server: String::new(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::Cli,
            cli_config: None,
            device: "cpu".to_string(),
            workers: defaults::SYNTHESIS_WORKERS,
        }
    }
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            adjust: true,
            max_speed: defaults::MAX_SPEED,
            chunk_size_ms: defaults::DEFAULT_CHUNK_SIZE_MS,
        }
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            vocals_volume_adjustment: defaults::VOCALS_VOLUME_ADJUSTMENT,
            background_volume_adjustment: defaults::BACKGROUND_VOLUME_ADJUSTMENT,
        }
    }
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            backend: SeparationBackend::None,
            device: "cpu".to_string(),
        }
    }
}

fn invalid(key: &str, message: &str) -> DubError {
    DubError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - OPENDUB_SOURCE_LANGUAGE → dubbing.source_language
    /// - OPENDUB_TARGET_LANGUAGE → dubbing.target_language
    /// - OPENDUB_OUTPUT_DIR → dubbing.output_directory
    /// - OPENDUB_APERTIUM_SERVER → translation.apertium_server
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(language) = std::env::var("OPENDUB_SOURCE_LANGUAGE")
            && !language.is_empty()
        {
            self.dubbing.source_language = language;
        }

        if let Ok(language) = std::env::var("OPENDUB_TARGET_LANGUAGE")
            && !language.is_empty()
        {
            self.dubbing.target_language = language;
        }

        if let Ok(dir) = std::env::var("OPENDUB_OUTPUT_DIR")
            && !dir.is_empty()
        {
            self.dubbing.output_directory = PathBuf::from(dir);
        }

        if let Ok(server) = std::env::var("OPENDUB_APERTIUM_SERVER")
            && !server.is_empty()
        {
            self.translation.apertium_server = server;
        }

        self
    }

    /// Check values that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        for (key, code) in [
            ("dubbing.source_language", &self.dubbing.source_language),
            ("dubbing.target_language", &self.dubbing.target_language),
        ] {
            if code.trim().is_empty() {
                return Err(invalid(key, "must not be empty"));
            }
            if !language::is_iso_639_3_shaped(code) {
                return Err(invalid(key, "must be a three-letter ISO 639-3 code such as 'eng'"));
            }
        }
        if self.speed.max_speed.is_nan() || self.speed.max_speed < 1.0 {
            return Err(invalid("speed.max_speed", "must be at least 1.0"));
        }
        if self.speed.chunk_size_ms == 0 {
            return Err(invalid("speed.chunk_size_ms", "must be greater than 0"));
        }
        if self.tts.workers == 0 {
            return Err(invalid("tts.workers", "must be at least 1"));
        }
        if self.segmentation.backend == SegmentationBackend::Rttm
            && self.segmentation.rttm_file.is_none()
        {
            return Err(invalid(
                "segmentation.rttm_file",
                "required when segmentation.backend = \"rttm\"",
            ));
        }
        Ok(())
    }

    /// Settings for one run on `input_file`.
    pub fn run_settings(&self, input_file: &Path) -> RunSettings {
        let mut settings = RunSettings::new(
            input_file,
            &self.dubbing.source_language,
            &self.dubbing.target_language,
        )
        .with_output_dir(self.dubbing.output_directory.clone());
        settings.target_language_region = self.dubbing.target_language_region.clone();
        settings.debug = self.dubbing.debug;
        settings.no_dubbing_phrases = self.dubbing.no_dubbing_phrases.clone();
        settings.synthesis_workers = self.tts.workers;
        settings.adjust_speed = self.speed.adjust;
        settings.max_speed = self.speed.max_speed;
        settings.chunk_size_ms = self.speed.chunk_size_ms;
        settings.vocals_volume_adjustment = self.mix.vocals_volume_adjustment;
        settings.background_volume_adjustment = self.mix.background_volume_adjustment;
        settings
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/opendub/config.toml on Linux, or `config.toml` in
    /// the working directory when no config directory is known.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("opendub"))
            .unwrap_or_default()
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::{remove_env, set_env};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_opendub_env() {
        remove_env("OPENDUB_SOURCE_LANGUAGE");
        remove_env("OPENDUB_TARGET_LANGUAGE");
        remove_env("OPENDUB_OUTPUT_DIR");
        remove_env("OPENDUB_APERTIUM_SERVER");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.dubbing.target_language, "cat");
        assert_eq!(config.dubbing.output_directory, PathBuf::from("output"));
        assert_eq!(config.segmentation.backend, SegmentationBackend::Energy);
        assert_eq!(config.speed.max_speed, 1.3);
        assert_eq!(config.speed.chunk_size_ms, 150);
        assert!(config.speed.adjust);
        assert_eq!(config.mix.vocals_volume_adjustment, 5.0);
        assert_eq!(config.mix.background_volume_adjustment, 0.0);
        assert_eq!(config.separation.backend, SeparationBackend::None);
        assert_eq!(config.tts.workers, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [dubbing]
            source_language = "spa"
            target_language = "cat"
            target_language_region = "valencia"
            debug = true
            no_dubbing_phrases = ["Gracias"]

            [segmentation]
            backend = "rttm"
            rttm_file = "/data/talk.rttm"

            [translation]
            apertium_server = "http://localhost:2737"

            [tts]
            cli_config = "/etc/opendub/piper.json"
            workers = 4

            [speed]
            max_speed = 1.2

            [separation]
            backend = "demucs"
            device = "cuda"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.dubbing.source_language, "spa");
        assert_eq!(
            config.dubbing.target_language_region.as_deref(),
            Some("valencia")
        );
        assert!(config.dubbing.debug);
        assert_eq!(config.segmentation.backend, SegmentationBackend::Rttm);
        assert_eq!(config.translation.apertium_server, "http://localhost:2737");
        assert_eq!(config.tts.workers, 4);
        assert_eq!(config.speed.max_speed, 1.2);
        assert_eq!(config.speed.chunk_size_ms, 150);
        assert_eq!(config.separation.backend, SeparationBackend::Demucs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[mix]\nvocals_volume_adjustment = 3.0\n")
            .unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.mix.vocals_volume_adjustment, 3.0);
        assert_eq!(config.mix.background_volume_adjustment, 0.0);
        assert_eq!(config.dubbing, DubbingConfig::default());
    }

    #[test]
    fn test_env_override_languages() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_opendub_env();
        set_env("OPENDUB_SOURCE_LANGUAGE", "fra");
        set_env("OPENDUB_TARGET_LANGUAGE", "spa");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.dubbing.source_language, "fra");
        assert_eq!(config.dubbing.target_language, "spa");

        clear_opendub_env();
    }

    #[test]
    fn test_env_override_output_and_server() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_opendub_env();
        set_env("OPENDUB_OUTPUT_DIR", "/tmp/dub");
        set_env("OPENDUB_APERTIUM_SERVER", "http://apy:2737");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.dubbing.output_directory, PathBuf::from("/tmp/dub"));
        assert_eq!(config.translation.apertium_server, "http://apy:2737");

        clear_opendub_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_opendub_env();
        set_env("OPENDUB_TARGET_LANGUAGE", "");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.dubbing.target_language, "cat");

        clear_opendub_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[speed\nmax_speed = ").unwrap();
        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[separation]\nbackend = \"spleeter\"\n")
            .unwrap();
        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/opendub.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        let path = Config::default_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.speed.max_speed = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.speed.chunk_size_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tts.workers = 0;
        assert_eq!(config.validate().unwrap_err().exit_code(), 109);

        let mut config = Config::default();
        config.dubbing.target_language = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.dubbing.source_language = "en".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.segmentation.backend = SegmentationBackend::Rttm;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_settings_carry_config() {
        let mut config = Config::default();
        config.dubbing.no_dubbing_phrases = vec!["ok".to_string()];
        config.speed.adjust = false;
        let settings = config.run_settings(Path::new("talk.mp4"));
        assert_eq!(settings.input_file, PathBuf::from("talk.mp4"));
        assert_eq!(settings.no_dubbing_phrases, vec!["ok"]);
        assert!(!settings.adjust_speed);
    }

    #[test]
    fn test_toml_dump_round_trips() {
        let config = Config::default();
        let dumped = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&dumped).unwrap();
        assert_eq!(parsed, config);
    }
}
