//! Command-line interface for opendub
//!
//! Provides argument parsing using clap derive macros.

use crate::config::{Config, SegmentationBackend, SeparationBackend};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Automatic video dubbing with open models
#[derive(Parser, Debug)]
#[command(name = "opendub", version, about = "Automatic video dubbing with open models")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub dub: DubArgs,
}

/// Options of the default dubbing action; each overrides the config file.
#[derive(clap::Args, Debug, Default, Clone, PartialEq)]
pub struct DubArgs {
    /// Video to dub (mp4, mkv, mov, webm)
    #[arg(long, short = 'i', value_name = "FILE")]
    pub input_file: Option<PathBuf>,

    /// Spoken language, ISO 639-3 (e.g. eng)
    #[arg(long, value_name = "LANG")]
    pub source_language: Option<String>,

    /// Language to dub into, ISO 639-3 (e.g. cat)
    #[arg(long, value_name = "LANG")]
    pub target_language: Option<String>,

    /// Preferred voice region (e.g. valencia)
    #[arg(long, value_name = "REGION")]
    pub target_language_region: Option<String>,

    /// Directory for the dubbed files
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_directory: Option<PathBuf>,

    /// Apertium APy server URL
    #[arg(long, value_name = "URL")]
    pub apertium_server: Option<String>,

    /// JSON file describing the TTS command and its voices
    #[arg(long, value_name = "FILE")]
    pub tts_cli_config: Option<PathBuf>,

    /// Whisper ggml model file
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// RTTM file with speaker turns (segments and speakers)
    #[arg(long, value_name = "FILE")]
    pub rttm_file: Option<PathBuf>,

    /// Separate vocals from background with Demucs
    #[arg(long)]
    pub demucs: bool,

    /// Device for separation and synthesis (cpu, cuda)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Concurrent synthesizer calls
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Never speed up dubbed speech
    #[arg(long)]
    pub no_adjust_speed: bool,

    /// Keep intermediate files
    #[arg(long)]
    pub debug: bool,
}

impl DubArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply_to(&self, mut config: Config) -> Config {
        if let Some(language) = &self.source_language {
            config.dubbing.source_language = language.clone();
        }
        if let Some(language) = &self.target_language {
            config.dubbing.target_language = language.clone();
        }
        if let Some(region) = &self.target_language_region {
            config.dubbing.target_language_region = Some(region.clone());
        }
        if let Some(dir) = &self.output_directory {
            config.dubbing.output_directory = dir.clone();
        }
        if let Some(server) = &self.apertium_server {
            config.translation.apertium_server = server.clone();
        }
        if let Some(path) = &self.tts_cli_config {
            config.tts.cli_config = Some(path.clone());
        }
        if let Some(model) = &self.model {
            config.stt.model = model.clone();
        }
        if let Some(rttm) = &self.rttm_file {
            config.segmentation.backend = SegmentationBackend::Rttm;
            config.segmentation.rttm_file = Some(rttm.clone());
        }
        if self.demucs {
            config.separation.backend = SeparationBackend::Demucs;
        }
        if let Some(device) = &self.device {
            config.tts.device = device.clone();
            config.separation.device = device.clone();
        }
        if let Some(workers) = self.workers {
            config.tts.workers = workers;
        }
        if self.no_adjust_speed {
            config.speed.adjust = false;
        }
        if self.debug {
            config.dubbing.debug = true;
        }
        config
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check external tools and configured services
    Check,

    /// List supported languages and their codes
    Languages,

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the default configuration as TOML
    Dump,
    /// Print the effective configuration (file, environment and flags merged)
    Show,
}
