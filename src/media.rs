//! Media plumbing around external tools.
//!
//! - [`CommandExecutor`]: runs a program and returns its stdout; mockable.
//! - [`MediaTool`]: probe, split and mux media files (ffmpeg/ffprobe).
//! - [`SourceSeparator`]: split a track into vocals and background stems.
//!
//! Programs are always started directly with an argument vector, never
//! through a shell.

use crate::defaults;
use crate::error::{DubError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync for use in concurrent contexts.
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments.
    ///
    /// Returns the stdout of the command on success. A missing program is
    /// reported as [`DubError::ToolNotFound`].
    fn execute(&self, command: &str, args: &[&str]) -> Result<String>;
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        tracing::debug!(command, ?args, "Running external command");
        let output = Command::new(command).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DubError::ToolNotFound {
                    tool: command.to_string(),
                }
            } else {
                DubError::Media {
                    message: format!("Failed to execute {}: {}", command, e),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DubError::Media {
                message: format!(
                    "{} failed with status {:?}: {}",
                    command,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<E> {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        (**self).execute(command, args)
    }
}

/// Fail with [`DubError::ToolNotFound`] unless `tool -version` runs.
pub fn ensure_tool(executor: &dyn CommandExecutor, tool: &str) -> Result<()> {
    match executor.execute(tool, &["-version"]) {
        Ok(_) => Ok(()),
        Err(DubError::ToolNotFound { tool }) => Err(DubError::ToolNotFound { tool }),
        Err(e) => {
            tracing::debug!(tool, error = %e, "Tool present but version query failed");
            Ok(())
        }
    }
}

/// Audio and video tracks of the input, split apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMedia {
    /// Mono 16-bit WAV at the mixing rate.
    pub audio: PathBuf,
    /// Video stream without audio.
    pub video: PathBuf,
}

/// Probing, splitting and muxing of media files.
pub trait MediaTool: Send + Sync {
    /// Names of the external programs this tool needs.
    fn required_tools(&self) -> Vec<String> {
        Vec::new()
    }

    /// Check every required program is installed.
    fn verify_tools(&self) -> Result<()> {
        Ok(())
    }

    fn duration_secs(&self, input: &Path) -> Result<f64>;

    fn split(&self, input: &Path, output_dir: &Path, stem: &str) -> Result<SplitMedia>;

    /// Mux `audio` onto `video`; audio is padded or cut to the video length.
    fn combine(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

/// [`MediaTool`] backed by ffmpeg and ffprobe.
#[derive(Debug, Clone)]
pub struct FfmpegTool<E: CommandExecutor> {
    executor: E,
}

impl<E: CommandExecutor> FfmpegTool<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| DubError::Media {
        message: format!("Path is not valid UTF-8: {}", path.display()),
    })
}

impl<E: CommandExecutor> MediaTool for FfmpegTool<E> {
    fn required_tools(&self) -> Vec<String> {
        vec!["ffmpeg".to_string(), "ffprobe".to_string()]
    }

    fn verify_tools(&self) -> Result<()> {
        for tool in self.required_tools() {
            ensure_tool(&self.executor, &tool)?;
        }
        Ok(())
    }

    fn duration_secs(&self, input: &Path) -> Result<f64> {
        let stdout = self.executor.execute(
            "ffprobe",
            &[
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                path_arg(input)?,
            ],
        )?;
        stdout.trim().parse::<f64>().map_err(|_| DubError::Media {
            message: format!("ffprobe returned no duration for {}", input.display()),
        })
    }

    fn split(&self, input: &Path, output_dir: &Path, stem: &str) -> Result<SplitMedia> {
        let audio = output_dir.join(format!("{stem}_audio.wav"));
        let video = output_dir.join(format!("{stem}_video.mp4"));
        let rate = defaults::MIX_SAMPLE_RATE.to_string();

        self.executor.execute(
            "ffmpeg",
            &[
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                path_arg(input)?,
                "-vn",
                "-acodec",
                "pcm_s16le",
                "-ar",
                &rate,
                "-ac",
                "1",
                path_arg(&audio)?,
            ],
        )?;
        self.executor.execute(
            "ffmpeg",
            &[
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                path_arg(input)?,
                "-an",
                "-c:v",
                "copy",
                path_arg(&video)?,
            ],
        )?;

        Ok(SplitMedia { audio, video })
    }

    fn combine(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.executor.execute(
            "ffmpeg",
            &[
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                path_arg(video)?,
                "-i",
                path_arg(audio)?,
                "-map",
                "0:v",
                "-map",
                "1:a",
                "-c:v",
                "copy",
                "-c:a",
                "aac",
                "-af",
                "apad",
                "-shortest",
                path_arg(output)?,
            ],
        )?;
        Ok(())
    }
}

/// Vocals and background of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stems {
    pub vocals: PathBuf,
    pub background: PathBuf,
}

/// Splits speech from everything else.
pub trait SourceSeparator: Send + Sync {
    fn name(&self) -> &str;

    fn verify_tools(&self) -> Result<()> {
        Ok(())
    }

    fn separate(&self, audio: &Path, output_dir: &Path) -> Result<Stems>;
}

/// Uses the full track as both stems.
#[derive(Debug, Clone, Default)]
pub struct NoSeparation;

impl SourceSeparator for NoSeparation {
    fn name(&self) -> &str {
        "none"
    }

    fn separate(&self, audio: &Path, _output_dir: &Path) -> Result<Stems> {
        Ok(Stems {
            vocals: audio.to_path_buf(),
            background: audio.to_path_buf(),
        })
    }
}

/// Demucs two-stem separation through `python -m demucs.separate`.
#[derive(Debug, Clone)]
pub struct DemucsSeparator<E: CommandExecutor> {
    executor: E,
    python: String,
    model: String,
    device: String,
}

impl<E: CommandExecutor> DemucsSeparator<E> {
    pub fn new(executor: E, device: &str) -> Self {
        Self {
            executor,
            python: "python3".to_string(),
            model: "htdemucs".to_string(),
            device: device.to_string(),
        }
    }

    pub fn with_python(mut self, python: &str) -> Self {
        self.python = python.to_string();
        self
    }
}

impl<E: CommandExecutor> SourceSeparator for DemucsSeparator<E> {
    fn name(&self) -> &str {
        "demucs"
    }

    fn verify_tools(&self) -> Result<()> {
        self.executor
            .execute(&self.python, &["-c", "import demucs"])
            .map(|_| ())
            .map_err(|e| match e {
                DubError::ToolNotFound { tool } => DubError::ToolNotFound { tool },
                _ => DubError::ToolNotFound {
                    tool: "demucs".to_string(),
                },
            })
    }

    fn separate(&self, audio: &Path, output_dir: &Path) -> Result<Stems> {
        self.executor.execute(
            &self.python,
            &[
                "-m",
                "demucs.separate",
                "-o",
                path_arg(output_dir)?,
                "-n",
                &self.model,
                "--two-stems",
                "vocals",
                "-d",
                &self.device,
                path_arg(audio)?,
            ],
        )?;

        let track = audio
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");
        let stem_dir = output_dir.join(&self.model).join(track);
        let stems = Stems {
            vocals: stem_dir.join("vocals.wav"),
            background: stem_dir.join("no_vocals.wav"),
        };
        for path in [&stems.vocals, &stems.background] {
            if !path.exists() {
                return Err(DubError::Media {
                    message: format!("Demucs did not produce {}", path.display()),
                });
            }
        }
        Ok(stems)
    }
}

/// Lowercase ASCII alphanumerics of the file stem, used to name derived files.
pub fn normalized_stem(input: &Path) -> String {
    let stem: String = input
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if stem.is_empty() {
        "input".to_string()
    } else {
        stem
    }
}

/// The input must exist and be one of the accepted video containers.
pub fn check_input_file(input: &Path) -> Result<()> {
    let extension = input
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !defaults::ACCEPTED_VIDEO_FORMATS.contains(&extension.as_str()) {
        return Err(DubError::UnsupportedFileFormat { extension });
    }
    if !input.is_file() {
        return Err(DubError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Input file not found: {}", input.display()),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    // Mock executor for testing
    #[derive(Clone, Default)]
    struct MockCommandExecutor {
        commands: Arc<Mutex<Vec<String>>>,
        stdout: String,
        missing: Vec<String>,
    }

    impl MockCommandExecutor {
        fn with_stdout(stdout: &str) -> Self {
            Self {
                stdout: stdout.to_string(),
                ..Self::default()
            }
        }

        fn with_missing(tool: &str) -> Self {
            Self {
                missing: vec![tool.to_string()],
                ..Self::default()
            }
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl CommandExecutor for MockCommandExecutor {
        fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
            if self.missing.iter().any(|m| m == command) {
                return Err(DubError::ToolNotFound {
                    tool: command.to_string(),
                });
            }
            self.commands
                .lock()
                .unwrap()
                .push(format!("{} {}", command, args.join(" ")));
            Ok(self.stdout.clone())
        }
    }

    #[test]
    fn test_duration_parses_ffprobe_output() {
        let tool = FfmpegTool::new(MockCommandExecutor::with_stdout("12.480000\n"));
        assert_eq!(tool.duration_secs(Path::new("in.mp4")).unwrap(), 12.48);
    }

    #[test]
    fn test_duration_rejects_garbage() {
        let tool = FfmpegTool::new(MockCommandExecutor::with_stdout("N/A"));
        assert!(tool.duration_secs(Path::new("in.mp4")).is_err());
    }

    #[test]
    fn test_split_extracts_mono_pcm_and_silent_video() {
        let executor = MockCommandExecutor::default();
        let tool = FfmpegTool::new(executor.clone());
        let split = tool
            .split(Path::new("/in/talk.mp4"), Path::new("/out"), "talk")
            .unwrap();
        assert_eq!(split.audio, PathBuf::from("/out/talk_audio.wav"));
        assert_eq!(split.video, PathBuf::from("/out/talk_video.mp4"));

        let commands = executor.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].contains("-vn -acodec pcm_s16le -ar 44100 -ac 1"));
        assert!(commands[1].contains("-an -c:v copy"));
    }

    #[test]
    fn test_combine_pads_audio_to_video_length() {
        let executor = MockCommandExecutor::default();
        FfmpegTool::new(executor.clone())
            .combine(
                Path::new("/o/v.mp4"),
                Path::new("/o/a.wav"),
                Path::new("/o/dubbed_video_cat.mp4"),
            )
            .unwrap();
        let command = &executor.commands()[0];
        assert!(command.contains("-af apad -shortest"));
        assert!(command.ends_with("/o/dubbed_video_cat.mp4"));
    }

    #[test]
    fn test_verify_tools_reports_missing_ffprobe() {
        let tool = FfmpegTool::new(MockCommandExecutor::with_missing("ffprobe"));
        match tool.verify_tools() {
            Err(DubError::ToolNotFound { tool }) => assert_eq!(tool, "ffprobe"),
            other => panic!("expected ToolNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_no_separation_returns_input_for_both_stems() {
        let stems = NoSeparation
            .separate(Path::new("/a.wav"), Path::new("/out"))
            .unwrap();
        assert_eq!(stems.vocals, stems.background);
    }

    #[test]
    fn test_demucs_reads_stems_from_model_directory() {
        let dir = TempDir::new().unwrap();
        let stem_dir = dir.path().join("htdemucs").join("talk_audio");
        std::fs::create_dir_all(&stem_dir).unwrap();
        std::fs::write(stem_dir.join("vocals.wav"), b"v").unwrap();
        std::fs::write(stem_dir.join("no_vocals.wav"), b"b").unwrap();

        let executor = MockCommandExecutor::default();
        let separator = DemucsSeparator::new(executor.clone(), "cpu");
        let stems = separator
            .separate(&dir.path().join("talk_audio.wav"), dir.path())
            .unwrap();
        assert_eq!(stems.background, stem_dir.join("no_vocals.wav"));
        assert!(executor.commands()[0].contains("--two-stems vocals -d cpu"));
    }

    #[test]
    fn test_demucs_runs_configured_python() {
        let executor = MockCommandExecutor::default();
        let separator = DemucsSeparator::new(executor.clone(), "cuda").with_python("python3.11");
        separator.verify_tools().unwrap();
        assert_eq!(executor.commands()[0], "python3.11 -c import demucs");
    }

    #[test]
    fn test_demucs_missing_output_is_error() {
        let dir = TempDir::new().unwrap();
        let separator = DemucsSeparator::new(MockCommandExecutor::default(), "cpu");
        assert!(
            separator
                .separate(&dir.path().join("a.wav"), dir.path())
                .is_err()
        );
    }

    #[test]
    fn test_normalized_stem_keeps_lowercase_alphanumerics() {
        assert_eq!(normalized_stem(Path::new("/v/My Talk-2024!.mp4")), "mytalk2024");
        assert_eq!(normalized_stem(Path::new("/v/___.mp4")), "input");
    }

    #[test]
    fn test_check_input_file_rejects_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.avi");
        std::fs::write(&path, b"x").unwrap();
        let err = check_input_file(&path).unwrap_err();
        assert_eq!(err.exit_code(), 103);
    }

    #[test]
    fn test_check_input_file_accepts_existing_video() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.MP4");
        std::fs::write(&path, b"x").unwrap();
        assert!(check_input_file(&path).is_ok());
        assert!(check_input_file(&dir.path().join("missing.mp4")).is_err());
    }
}
