//! Command-line interface for talkback
//!
//! Provides argument parsing using clap derive macros.

use crate::stt::ModelPreset;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Real-time microphone transcription with text-to-speech playback
#[derive(Parser, Debug)]
#[command(
    name = "talkback",
    version,
    about = "Real-time microphone transcription with text-to-speech playback"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress transcription output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Audio input device (see `talkback devices`)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Model preset: tiny, base, small, medium, large
    #[arg(long, value_name = "PRESET")]
    pub preset: Option<ModelPreset>,

    /// Language code for transcription (default: auto-detect). Examples: auto, en, de
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Chunk duration in seconds for progressive transcription
    #[arg(long, short = 'c', value_name = "SECONDS")]
    pub chunk_secs: Option<f32>,

    /// Inference worker count (default: derived from the preset)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Write the transcript to this file on stop (atomic write)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Emit one JSON event per line instead of human output
    #[arg(long)]
    pub json: bool,

    /// Prevent automatic model download if the configured preset is missing
    #[arg(long)]
    pub no_download: bool,

    /// Watchdog timeout for stalled capture/inference. Examples: 30s, 2m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
    pub watchdog: Option<Duration>,
}

/// Parse a duration argument.
///
/// Accepts bare numbers (seconds) and any format `humantime` understands
/// (`30s`, `5m`, `1h30m`).
fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Manage recognition models
    Models {
        /// Action to perform
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Speak text through the text-to-speech engine
    Speak {
        /// Text to speak
        text: String,

        /// TTS command override (default from config, e.g. espeak-ng)
        #[arg(long, value_name = "COMMAND")]
        tts_command: Option<String>,
    },

    /// Check system dependencies
    Check,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Model management actions
#[derive(Subcommand, Debug)]
pub enum ModelsAction {
    /// List presets and their installation status
    List,

    /// Download and install a preset's model
    Install {
        /// Preset to install
        preset: ModelPreset,
    },

    /// Print the on-disk path for a preset's model
    Path {
        /// Preset to resolve
        preset: ModelPreset,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_run_with_overrides() {
        let cli = Cli::parse_from([
            "talkback",
            "--preset",
            "small",
            "--chunk-secs",
            "2.5",
            "--device",
            "pipewire",
            "--json",
        ]);
        assert!(cli.command.is_none());
        assert_eq!(cli.preset, Some(ModelPreset::Small));
        assert_eq!(cli.chunk_secs, Some(2.5));
        assert_eq!(cli.device.as_deref(), Some("pipewire"));
        assert!(cli.json);
    }

    #[test]
    fn rejects_unknown_preset() {
        assert!(Cli::try_parse_from(["talkback", "--preset", "huge"]).is_err());
    }

    #[test]
    fn parses_speak_subcommand() {
        let cli = Cli::parse_from(["talkback", "speak", "hello there"]);
        match cli.command {
            Some(Commands::Speak { text, tts_command }) => {
                assert_eq!(text, "hello there");
                assert!(tts_command.is_none());
            }
            other => panic!("expected Speak, got {:?}", other),
        }
    }

    #[test]
    fn parses_models_install() {
        let cli = Cli::parse_from(["talkback", "models", "install", "medium"]);
        match cli.command {
            Some(Commands::Models {
                action: ModelsAction::Install { preset },
            }) => assert_eq!(preset, ModelPreset::Medium),
            other => panic!("expected Models Install, got {:?}", other),
        }
    }

    #[test]
    fn watchdog_accepts_bare_seconds_and_humantime() {
        let cli = Cli::parse_from(["talkback", "--watchdog", "45"]);
        assert_eq!(cli.watchdog, Some(Duration::from_secs(45)));

        let cli = Cli::parse_from(["talkback", "--watchdog", "1m30s"]);
        assert_eq!(cli.watchdog, Some(Duration::from_secs(90)));

        assert!(Cli::try_parse_from(["talkback", "--watchdog", "soon"]).is_err());
    }

    #[test]
    fn verify_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
