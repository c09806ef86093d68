//! Synthesizer that shells out to any command-line TTS program.
//!
//! Configured by a JSON file:
//!
//! ```json
//! {
//!   "command": "piper --model {assigned_voice} --output_file {output}",
//!   "voices": [
//!     {"id": "ca_ES-upc_ona-medium.onnx", "gender": "female", "region": "central", "language": "cat"}
//!   ]
//! }
//! ```
//!
//! Placeholders: `{assigned_voice}`, `{text}`, `{directory}`, `{device}`,
//! `{output}`, `{speed}`. The template is split on whitespace before
//! substitution, so `{text}` always reaches the program as one argument.
//! When the template has no `{output}`, `output_pattern` names the file the
//! program writes and it is moved into place afterwards. A `{speed}`
//! placeholder marks the program as honouring the requested rate.

use crate::error::{DubError, Result};
use crate::media::CommandExecutor;
use crate::tts::{SynthesisRequest, Synthesizer, Voice};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct CommandVoice {
    pub id: String,
    pub gender: String,
    #[serde(default)]
    pub region: Option<String>,
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandSynthesizerConfig {
    pub command: String,
    #[serde(default)]
    pub output_pattern: Option<String>,
    #[serde(default)]
    pub voices: Vec<CommandVoice>,
}

impl CommandSynthesizerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DubError::SynthesisConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| DubError::ConfigInvalidValue {
                key: "tts.cli_config".to_string(),
                message: format!("{}: {}", path.display(), e),
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.command.split_whitespace().next().is_none() {
            return Err(DubError::ConfigInvalidValue {
                key: "tts.command".to_string(),
                message: "command must not be empty".to_string(),
            });
        }
        if !self.command.contains("{output}") && self.output_pattern.is_none() {
            return Err(DubError::ConfigInvalidValue {
                key: "tts.output_pattern".to_string(),
                message: "either use {output} in the command or set output_pattern".to_string(),
            });
        }
        Ok(())
    }
}

pub struct CommandSynthesizer<E: CommandExecutor> {
    config: CommandSynthesizerConfig,
    executor: E,
    device: String,
}

impl<E: CommandExecutor> CommandSynthesizer<E> {
    pub fn new(config: CommandSynthesizerConfig, executor: E, device: &str) -> Self {
        Self {
            config,
            executor,
            device: device.to_string(),
        }
    }

    pub fn from_file(path: &Path, executor: E, device: &str) -> Result<Self> {
        Ok(Self::new(CommandSynthesizerConfig::load(path)?, executor, device))
    }

    /// Expand every known placeholder in one left-to-right pass, so text
    /// that happens to contain `{output}` and the like is passed verbatim.
    fn substitute(&self, template: &str, request: &SynthesisRequest) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let value = tail
                .find('}')
                .and_then(|close| Some((self.placeholder(&tail[1..close], request)?, close)));
            match value {
                Some((value, close)) => {
                    out.push_str(&value);
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn placeholder(&self, name: &str, request: &SynthesisRequest) -> Option<String> {
        let value = match name {
            "assigned_voice" => request.voice.clone(),
            "text" => request.text.clone(),
            "directory" => request
                .output_path
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "device" => self.device.clone(),
            "output" => request.output_path.display().to_string(),
            "speed" => format!("{:.3}", request.speed),
            _ => return None,
        };
        Some(value)
    }

    /// Program and argument vector for one request.
    pub fn command_line(&self, request: &SynthesisRequest) -> Result<(String, Vec<String>)> {
        let mut parts = self
            .config
            .command
            .split_whitespace()
            .map(|part| self.substitute(part, request));
        let program = parts.next().ok_or_else(|| DubError::ConfigInvalidValue {
            key: "tts.command".to_string(),
            message: "command must not be empty".to_string(),
        })?;
        Ok((program, parts.collect()))
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}

impl<E: CommandExecutor> Synthesizer for CommandSynthesizer<E> {
    fn name(&self) -> &str {
        "cli"
    }

    fn languages(&self) -> Result<Vec<String>> {
        let mut languages: Vec<String> = self
            .config
            .voices
            .iter()
            .map(|v| v.language.clone())
            .collect();
        languages.sort();
        languages.dedup();
        Ok(languages)
    }

    fn available_voices(&self, language: &str) -> Result<Vec<Voice>> {
        Ok(self
            .config
            .voices
            .iter()
            .filter(|v| v.language == language)
            .map(|v| Voice {
                name: v.id.clone(),
                gender: v.gender.clone(),
                region: v.region.clone(),
            })
            .collect())
    }

    fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf> {
        let (program, args) = self.command_line(request)?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.executor.execute(&program, &args)?;

        if let Some(pattern) = self.config.output_pattern.as_deref()
            && !self.config.command.contains("{output}")
        {
            let produced = PathBuf::from(self.substitute(pattern, request));
            if !produced.exists() {
                return Err(DubError::Synthesis {
                    message: format!("{} did not produce {}", program, produced.display()),
                });
            }
            move_file(&produced, &request.output_path)?;
        }

        if !request.output_path.exists() {
            return Err(DubError::Synthesis {
                message: format!(
                    "{} did not produce {}",
                    program,
                    request.output_path.display()
                ),
            });
        }
        Ok(request.output_path.clone())
    }

    fn supports_variable_rate(&self) -> bool {
        self.config.command.contains("{speed}")
    }

    /// Programs that write to a fixed `output_pattern` must run one at a time.
    fn supports_concurrent_requests(&self) -> bool {
        self.config.command.contains("{output}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records invocations and writes a file where the program would.
    #[derive(Clone, Default)]
    struct FakeTts {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        writes: Option<PathBuf>,
    }

    impl CommandExecutor for FakeTts {
        fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
            let mut call = vec![command.to_string()];
            call.extend(args.iter().map(|a| a.to_string()));
            self.calls.lock().unwrap().push(call);

            let target = match &self.writes {
                Some(path) => Some(path.clone()),
                None => args
                    .iter()
                    .position(|a| *a == "--output_file")
                    .map(|i| PathBuf::from(args[i + 1])),
            };
            if let Some(path) = target {
                std::fs::write(path, b"RIFF").unwrap();
            }
            Ok(String::new())
        }
    }

    fn config(command: &str) -> CommandSynthesizerConfig {
        CommandSynthesizerConfig {
            command: command.to_string(),
            output_pattern: None,
            voices: vec![
                CommandVoice {
                    id: "ona".to_string(),
                    gender: "female".to_string(),
                    region: Some("central".to_string()),
                    language: "cat".to_string(),
                },
                CommandVoice {
                    id: "davefx".to_string(),
                    gender: "male".to_string(),
                    region: None,
                    language: "spa".to_string(),
                },
            ],
        }
    }

    fn request(dir: &Path, text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            voice: "ona".to_string(),
            language: "cat".to_string(),
            speed: 1.0,
            pitch: 0.0,
            volume_gain_db: 16.0,
            output_path: dir.join("dubbed.wav"),
        }
    }

    #[test]
    fn test_text_with_spaces_stays_one_argument() {
        let dir = TempDir::new().unwrap();
        let synth = CommandSynthesizer::new(
            config("tts --voice {assigned_voice} --text {text} --output_file {output}"),
            FakeTts::default(),
            "cpu",
        );
        let (program, args) = synth
            .command_line(&request(dir.path(), "bon dia; rm -rf /"))
            .unwrap();
        assert_eq!(program, "tts");
        assert_eq!(args[1], "ona");
        assert_eq!(args[3], "bon dia; rm -rf /");
        assert_eq!(args.len(), 6);
    }

    #[test]
    fn test_placeholders_inside_text_are_not_expanded() {
        let dir = TempDir::new().unwrap();
        let synth = CommandSynthesizer::new(
            config("tts --device {device} --text {text} --output_file {output}"),
            FakeTts::default(),
            "cuda",
        );
        let (_, args) = synth
            .command_line(&request(dir.path(), "say {output} on {device} at {speed}"))
            .unwrap();
        assert_eq!(args[1], "cuda");
        assert_eq!(args[3], "say {output} on {device} at {speed}");
        assert_eq!(args[5], dir.path().join("dubbed.wav").display().to_string());
    }

    #[test]
    fn test_unknown_braces_are_kept() {
        let dir = TempDir::new().unwrap();
        let synth = CommandSynthesizer::new(
            config("tts --json={\"a\":1} {unknown} {output"),
            FakeTts::default(),
            "cpu",
        );
        let (_, args) = synth.command_line(&request(dir.path(), "hola")).unwrap();
        assert_eq!(args, vec!["--json={\"a\":1}", "{unknown}", "{output"]);
    }

    #[test]
    fn test_fixed_output_pattern_disallows_concurrent_requests() {
        let direct = CommandSynthesizer::new(config("tts {output}"), FakeTts::default(), "cpu");
        let mut pattern = config("tts {text}");
        pattern.output_pattern = Some("/tmp/out.wav".to_string());
        let shared = CommandSynthesizer::new(pattern, FakeTts::default(), "cpu");
        assert!(direct.supports_concurrent_requests());
        assert!(!shared.supports_concurrent_requests());
    }

    #[test]
    fn test_synthesize_writes_to_output_placeholder() {
        let dir = TempDir::new().unwrap();
        let executor = FakeTts::default();
        let synth = CommandSynthesizer::new(
            config("tts {text} --output_file {output}"),
            executor.clone(),
            "cpu",
        );
        let path = synth.synthesize(&request(dir.path(), "hola")).unwrap();
        assert_eq!(path, dir.path().join("dubbed.wav"));
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_output_pattern_file_is_moved_into_place() {
        let dir = TempDir::new().unwrap();
        let produced = dir.path().join("out-ona.wav");
        let executor = FakeTts {
            writes: Some(produced.clone()),
            ..FakeTts::default()
        };
        let mut config = config("tts {text} --dir {directory}");
        config.output_pattern = Some("{directory}/out-{assigned_voice}.wav".to_string());
        let synth = CommandSynthesizer::new(config, executor, "cpu");

        let path = synth.synthesize(&request(dir.path(), "hola")).unwrap();
        assert!(path.exists());
        assert!(!produced.exists());
    }

    #[test]
    fn test_missing_output_is_synthesis_error() {
        let dir = TempDir::new().unwrap();
        let synth = CommandSynthesizer::new(
            config("tts {text} --out {output}"),
            FakeTts::default(),
            "cpu",
        );
        assert!(matches!(
            synth.synthesize(&request(dir.path(), "hola")),
            Err(DubError::Synthesis { .. })
        ));
    }

    #[test]
    fn test_voices_are_filtered_by_language() {
        let synth = CommandSynthesizer::new(config("tts {output}"), FakeTts::default(), "cpu");
        assert_eq!(synth.languages().unwrap(), vec!["cat", "spa"]);
        let voices = synth.available_voices("cat").unwrap();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].region.as_deref(), Some("central"));
    }

    #[test]
    fn test_speed_placeholder_enables_variable_rate() {
        let plain = CommandSynthesizer::new(config("tts {output}"), FakeTts::default(), "cpu");
        let rated = CommandSynthesizer::new(
            config("tts --rate {speed} {output}"),
            FakeTts::default(),
            "cpu",
        );
        assert!(!plain.supports_variable_rate());
        assert!(rated.supports_variable_rate());
    }

    #[test]
    fn test_missing_config_file_exits_108() {
        let err = CommandSynthesizerConfig::load(Path::new("/nonexistent/tts.json")).unwrap_err();
        assert_eq!(err.exit_code(), 108);
    }

    #[test]
    fn test_invalid_config_exits_109() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tts.json");
        std::fs::write(&path, r#"{"command": "tts {text}"}"#).unwrap();
        assert_eq!(
            CommandSynthesizerConfig::load(&path).unwrap_err().exit_code(),
            109
        );

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(
            CommandSynthesizerConfig::load(&path).unwrap_err().exit_code(),
            109
        );
    }

    #[test]
    fn test_valid_config_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tts.json");
        std::fs::write(
            &path,
            r#"{"command": "tts {text} {output}", "voices": [{"id": "ona", "gender": "female", "language": "cat"}]}"#,
        )
        .unwrap();
        let config = CommandSynthesizerConfig::load(&path).unwrap();
        assert_eq!(config.voices[0].region, None);
    }
}
