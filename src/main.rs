use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::Path;
use talkback::app::{SessionOptions, run_pipe_command, run_session_command, run_speak_command};
use talkback::audio::capture::list_devices;
use talkback::cli::{Cli, Commands, ModelsAction};
use talkback::config::Config;
use talkback::diagnostics::check_dependencies;
use talkback::models::catalog::list_models;
use talkback::models::download::{download_model, format_model_info, model_path};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            let opts = SessionOptions {
                device: cli.device,
                preset: cli.preset,
                language: cli.language,
                chunk_secs: cli.chunk_secs,
                workers: cli.workers,
                watchdog: cli.watchdog,
                output: cli.output,
                json: cli.json,
                quiet: cli.quiet,
                no_download: cli.no_download,
            };
            if std::io::stdin().is_terminal() {
                // Mic mode
                run_session_command(config, opts).await?;
            } else {
                // Pipe mode: stdin has WAV data
                run_pipe_command(config, opts).await?;
            }
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Models { action }) => {
            handle_models_command(action).await?;
        }
        Some(Commands::Speak { text, tts_command }) => {
            let config = load_config(cli.config.as_deref())?;
            run_speak_command(config, text, tts_command).await?;
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref())?;
            check_dependencies(&config);
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "talkback",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

fn list_audio_devices() -> Result<()> {
    let devices = list_devices()?;
    if devices.is_empty() {
        eprintln!("{}", "No audio input devices found".yellow());
        return Ok(());
    }

    println!("Audio input devices:");
    for device in devices {
        if let Some(name) = device.strip_suffix(" [recommended]") {
            println!("  {} {}", name, "[recommended]".green());
        } else {
            println!("  {}", device);
        }
    }
    Ok(())
}

async fn handle_models_command(action: ModelsAction) -> Result<()> {
    match action {
        ModelsAction::List => {
            println!("Available model presets:");
            for info in list_models() {
                println!("  {}", format_model_info(info));
            }
        }
        ModelsAction::Install { preset } => {
            download_model(preset, true).await?;
        }
        ModelsAction::Path { preset } => {
            println!("{}", model_path(preset).display());
        }
    }
    Ok(())
}
