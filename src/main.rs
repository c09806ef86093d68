use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use opendub::cli::{Cli, Commands, ConfigAction, DubArgs};
use opendub::config::{Config, SegmentationBackend, SeparationBackend};
use opendub::diagnostics::check_dependencies;
use opendub::error::DubError;
use opendub::language::{self, LANGUAGES};
use opendub::media::{DemucsSeparator, FfmpegTool, NoSeparation, SystemCommandExecutor};
use opendub::pipeline::{Collaborators, Dubber, RunContext};
use opendub::stt::segmenter::EnergySegmenterConfig;
use opendub::stt::whisper::{WhisperConfig, WhisperTranscriber};
use opendub::stt::{EnergySegmenter, RttmDiarizer, RttmSegmenter};
use opendub::translation::Translator;
use opendub::tts::command::CommandSynthesizer;
use owo_colors::OwoColorize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let code = e.downcast_ref::<DubError>().map_or(1, DubError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

/// RUST_LOG wins; otherwise `-q` shows warnings only and each `-v` goes one
/// level deeper than info.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref(), &cli.dub)?;
            dub(&config, &cli.dub, cli.quiet)
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref(), &cli.dub)?;
            if !check_dependencies(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Languages) => {
            list_languages();
            Ok(())
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref(), &cli.dub)
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "opendub", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Load configuration from file or use defaults.
///
/// Priority order, lowest first:
/// 1. Built-in defaults
/// 2. Config file (--config, else ~/.config/opendub/config.toml if present)
/// 3. OPENDUB_* environment variables
/// 4. Command-line flags
fn load_config(custom_path: Option<&Path>, args: &DubArgs) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    let config = args.apply_to(config.with_env_overrides());
    config.validate()?;
    Ok(config)
}

fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&Path>,
    args: &DubArgs,
) -> Result<()> {
    match action {
        ConfigAction::Dump => print!("{}", Config::default().to_toml()?),
        ConfigAction::Show => print!("{}", load_config(custom_path, args)?.to_toml()?),
    }
    Ok(())
}

fn list_languages() {
    println!("{:<8}{:<8}Name", "Code", "Short");
    for language in LANGUAGES {
        let short = if language.iso_639_1.is_empty() {
            "-"
        } else {
            language.iso_639_1
        };
        println!("{:<8}{:<8}{}", language.iso_639_3, short, language.name);
    }
}

/// Wire the configured backends together.
fn build_collaborators(config: &Config) -> Result<Collaborators> {
    let executor = Arc::new(SystemCommandExecutor::new());

    let transcriber = WhisperTranscriber::new(WhisperConfig {
        model_path: config.stt.model.clone(),
        threads: config.stt.threads,
    })?;

    let translator = build_translator(&config.translation.apertium_server)?;

    let Some(cli_config) = config.tts.cli_config.as_deref() else {
        return Err(DubError::ConfigInvalidValue {
            key: "tts.cli_config".to_string(),
            message: "a TTS command configuration file is required".to_string(),
        }
        .into());
    };
    let synthesizer =
        CommandSynthesizer::from_file(cli_config, executor.clone(), &config.tts.device)?;

    let mut parts = Collaborators::new(
        Arc::new(FfmpegTool::new(executor.clone())),
        Arc::new(transcriber),
        translator,
        Arc::new(synthesizer),
    );

    parts = match config.separation.backend {
        SeparationBackend::None => parts.with_separator(Arc::new(NoSeparation)),
        SeparationBackend::Demucs => parts.with_separator(Arc::new(DemucsSeparator::new(
            executor.clone(),
            &config.separation.device,
        ))),
    };

    let segmentation = &config.segmentation;
    parts = match (segmentation.backend, segmentation.rttm_file.as_deref()) {
        (SegmentationBackend::Rttm, Some(rttm)) => {
            parts.with_segmenter(Arc::new(RttmSegmenter::new(rttm)))
        }
        (SegmentationBackend::Rttm, None) => {
            bail!("segmentation.rttm_file is required for the rttm backend")
        }
        (SegmentationBackend::Energy, _) => {
            let energy = EnergySegmenterConfig {
                threshold: segmentation.threshold,
                min_silence_ms: segmentation.min_silence_ms,
                min_speech_ms: segmentation.min_speech_ms,
                padding_ms: segmentation.padding_ms,
                ..EnergySegmenterConfig::default()
            };
            parts.with_segmenter(Arc::new(EnergySegmenter::new(energy)))
        }
    };

    if let Some(rttm) = segmentation.rttm_file.as_deref() {
        parts = parts.with_diarizer(Arc::new(RttmDiarizer::new(rttm)));
    }

    Ok(parts)
}

#[cfg(feature = "apertium")]
fn build_translator(server: &str) -> Result<Arc<dyn Translator>> {
    use opendub::translation::apertium::ApertiumTranslator;

    Ok(Arc::new(ApertiumTranslator::new(server)?))
}

#[cfg(not(feature = "apertium"))]
fn build_translator(_server: &str) -> Result<Arc<dyn Translator>> {
    Err(DubError::ConfigInvalidValue {
        key: "translation.backend".to_string(),
        message: "this binary was built without the apertium feature".to_string(),
    }
    .into())
}

fn dub(config: &Config, args: &DubArgs, quiet: bool) -> Result<()> {
    let Some(input_file) = args.input_file.as_deref() else {
        bail!("No input file given; pass --input-file <FILE> or see --help");
    };

    tracing::debug!(version = %opendub::version_string(), "Starting run");
    tracing::info!(
        "Dubbing {} from {} into {}",
        input_file.display(),
        language::display_name(&config.dubbing.source_language),
        language::display_name(&config.dubbing.target_language)
    );
    let parts = build_collaborators(config)?;
    let context = RunContext::new(config.run_settings(input_file));
    let report = Dubber::new(context, parts).run()?;

    if quiet {
        return Ok(());
    }

    let dubbed = report.records.iter().filter(|r| r.for_dubbing).count();
    println!(
        "{} {} of {} utterances dubbed",
        "✓".green(),
        dubbed,
        report.records.len()
    );
    if let Some(outputs) = &report.outputs {
        println!("  audio:    {}", outputs.audio.display());
        if let Some(video) = &outputs.video {
            println!("  video:    {}", video.display().bold());
        }
    }
    if let Some(path) = &report.metadata_path {
        println!("  metadata: {}", path.display());
    }
    println!();
    println!("{}", report.timing);
    Ok(())
}
