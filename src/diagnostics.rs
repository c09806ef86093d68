//! System diagnostics and dependency checking.
//!
//! Verifies that the external tools and services a run needs are present.

use crate::config::{Config, SeparationBackend};
use crate::defaults;
use crate::stt::whisper::check_model_exists;
use crate::sys::available_disk_mb;
use crate::tts::command::CommandSynthesizerConfig;
use std::ffi::CString;
use std::path::Path;
use std::process::Command;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues
    Warning(String),
}

/// Check if a command exists and answers `version_flag`.
fn check_command(command: &str, version_flag: &str) -> CheckResult {
    match Command::new(command).arg(version_flag).output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("'{}' found but {} failed", command, version_flag)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", command, e)),
    }
}

/// Check that `python` can import the demucs package.
fn check_demucs(python: &str) -> CheckResult {
    match Command::new(python).args(["-c", "import demucs"]).output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning("python found but demucs is not installed".to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking demucs: {}", e)),
    }
}

/// Check that the TTS command config loads and names an installed program.
fn check_tts_config(path: Option<&Path>) -> CheckResult {
    let Some(path) = path else {
        return CheckResult::Warning("tts.cli_config is not set".to_string());
    };
    match CommandSynthesizerConfig::load(path) {
        Ok(config) => {
            let program = config.command.split_whitespace().next().unwrap_or_default();
            match Command::new(program).arg("--help").output() {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::Warning(
                    format!("'{}' from {} is not installed", program, path.display()),
                ),
                _ => CheckResult::Ok,
            }
        }
        Err(e) => CheckResult::Warning(e.to_string()),
    }
}

/// Free space below this in the output directory is flagged.
const MIN_FREE_DISK_MB: u64 = 1024;

/// Check free space where outputs go, or in the nearest existing parent.
fn check_disk_space(output_dir: &Path) -> CheckResult {
    let existing = output_dir
        .ancestors()
        .find(|dir| !dir.as_os_str().is_empty() && dir.exists())
        .unwrap_or(Path::new("."));
    let Ok(c_path) = CString::new(existing.to_string_lossy().as_bytes()) else {
        return CheckResult::Warning(format!("Invalid path: {}", existing.display()));
    };
    match available_disk_mb(&c_path) {
        Some(mb) if mb < MIN_FREE_DISK_MB => CheckResult::Warning(format!(
            "only {} MB free in {}",
            mb,
            existing.display()
        )),
        Some(_) => CheckResult::Ok,
        None => CheckResult::Warning(format!("could not stat {}", existing.display())),
    }
}

#[cfg(feature = "apertium")]
fn check_apertium(server: &str) -> CheckResult {
    use crate::translation::Translator;
    use crate::translation::apertium::ApertiumTranslator;

    let translator = match ApertiumTranslator::new(server) {
        Ok(translator) => translator,
        Err(e) => return CheckResult::Warning(e.to_string()),
    };
    match translator.language_pairs() {
        Ok(pairs) if pairs.is_empty() => {
            CheckResult::Warning("server answered but lists no language pairs".to_string())
        }
        Ok(_) => CheckResult::Ok,
        Err(e) => CheckResult::Warning(e.to_string()),
    }
}

#[cfg(not(feature = "apertium"))]
fn check_apertium(_server: &str) -> CheckResult {
    CheckResult::Warning("built without the apertium feature".to_string())
}

fn print_result(label: &str, result: &CheckResult, hint: &str) -> bool {
    print!("{:<28}", format!("{label}:"));
    match result {
        CheckResult::Ok => {
            println!("✓ OK");
            true
        }
        CheckResult::NotFound => {
            println!("✗ NOT FOUND");
            if !hint.is_empty() {
                println!("  {}", hint);
            }
            false
        }
        CheckResult::Warning(msg) => {
            println!("⚠ WARNING");
            for line in msg.lines() {
                println!("  {}", line);
            }
            false
        }
    }
}

/// Run all dependency checks and print results.
///
/// Returns true when everything a run needs is available.
pub fn check_dependencies(config: &Config) -> bool {
    println!("Checking system dependencies...\n");
    let mut ready = true;

    ready &= print_result(
        "ffmpeg",
        &check_command("ffmpeg", "-version"),
        "Install ffmpeg: sudo apt install ffmpeg",
    );
    ready &= print_result(
        "ffprobe",
        &check_command("ffprobe", "-version"),
        "ffprobe ships with ffmpeg",
    );

    if config.separation.backend == SeparationBackend::Demucs {
        ready &= print_result(
            "demucs",
            &check_demucs("python3"),
            "Install demucs: pip install demucs",
        );
    }

    let model = match check_model_exists(&config.stt.model) {
        Ok(()) => CheckResult::Ok,
        Err(e) => CheckResult::Warning(e.to_string()),
    };
    ready &= print_result("whisper model", &model, "");

    let server = &config.translation.apertium_server;
    let translation = if server.is_empty() {
        CheckResult::Warning("translation.apertium_server is not set".to_string())
    } else {
        check_apertium(server)
    };
    ready &= print_result("apertium server", &translation, "");

    ready &= print_result(
        "tts command",
        &check_tts_config(config.tts.cli_config.as_deref()),
        "",
    );

    ready &= print_result(
        "output disk space",
        &check_disk_space(&config.dubbing.output_directory),
        "",
    );

    println!();
    println!("GPU acceleration:");
    let compiled = defaults::gpu_backend();
    println!("  Compiled backend: {}", compiled);
    check_gpu_nvidia(compiled);

    println!();
    if ready {
        println!("✓ Ready to dub.");
    } else {
        println!("⚠ Some dependencies are missing; see above.");
    }
    ready
}

/// Check for NVIDIA GPU via `nvidia-smi`.
fn check_gpu_nvidia(compiled: &str) {
    print!("  NVIDIA (CUDA):   ");
    match Command::new("nvidia-smi")
        .arg("--query-gpu=gpu_name")
        .arg("--format=csv,noheader")
        .output()
    {
        Ok(output) if output.status.success() => {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if compiled == "CUDA" {
                println!("✓ Active ({})", name);
            } else {
                println!(
                    "✓ {} found → rebuild with: cargo build --release --features cuda",
                    name
                );
            }
        }
        _ => println!("- nvidia-smi not found"),
    }
}
