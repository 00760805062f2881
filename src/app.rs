//! Composition root: wires config, CLI overrides, engine, controller and
//! sinks together for the binary.

use crate::audio::capture::CpalSourceFactory;
use crate::audio::wav::WavAudioSource;
use crate::chunker::Chunker;
use crate::config::Config;
use crate::error::TalkbackError;
use crate::models::download::{download_model, is_model_installed, models_dir};
use crate::output::{JsonSink, TerminalSink};
use crate::session::sink::ResultSink;
use crate::session::types::{SessionEvent, TranscriptionResult};
use crate::session::{SessionController, Transcript, TranscriptSink};
use crate::stt::whisper::WhisperLoader;
use crate::stt::{ModelPreset, Transcriber, TranscriptionEngine};
use crate::tts::{CommandSynthesizer, Synthesizer};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CLI overrides applied on top of the config file.
#[derive(Debug, Default, Clone)]
pub struct SessionOptions {
    pub device: Option<String>,
    pub preset: Option<ModelPreset>,
    pub language: Option<String>,
    pub chunk_secs: Option<f32>,
    pub workers: Option<usize>,
    pub watchdog: Option<Duration>,
    pub output: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
    pub no_download: bool,
}

impl SessionOptions {
    fn merge_into(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.audio.device = Some(device.clone());
        }
        if let Some(preset) = self.preset {
            config.stt.preset = preset;
        }
        if let Some(language) = &self.language {
            config.stt.language = language.clone();
        }
        if let Some(chunk_secs) = self.chunk_secs {
            config.audio.chunk_secs = chunk_secs;
        }
        if let Some(workers) = self.workers {
            config.session.workers = workers;
        }
        if let Some(watchdog) = self.watchdog {
            config.session.watchdog_secs = watchdog.as_secs().max(1);
        }
    }
}

/// Make sure the preset's model is on disk, downloading it unless forbidden.
async fn ensure_model(preset: ModelPreset, no_download: bool, quiet: bool) -> Result<()> {
    if is_model_installed(preset) {
        return Ok(());
    }
    if no_download {
        return Err(TalkbackError::ModelNotFound {
            path: crate::models::download::model_path(preset)
                .to_string_lossy()
                .to_string(),
        }
        .into());
    }
    download_model(preset, !quiet).await?;
    Ok(())
}

fn build_engine(config: &Config) -> Arc<TranscriptionEngine> {
    let loader = WhisperLoader::new(models_dir(), config.stt.language.clone(), None);
    Arc::new(TranscriptionEngine::new(Box::new(loader)))
}

fn cli_sink(json: bool, quiet: bool) -> Box<dyn ResultSink> {
    if json {
        Box::new(JsonSink)
    } else {
        Box::new(TerminalSink::new(quiet))
    }
}

/// Live microphone session: start, run until Ctrl-C, stop, export.
pub async fn run_session_command(mut config: Config, opts: SessionOptions) -> Result<()> {
    opts.merge_into(&mut config);

    ensure_model(config.stt.preset, opts.no_download, opts.quiet).await?;

    let engine = build_engine(&config);
    let controller = SessionController::new(engine, Arc::new(CpalSourceFactory));
    controller.add_sink(cli_sink(opts.json, opts.quiet));

    controller.start(config.session_config())?;

    if !opts.quiet && !opts.json {
        eprintln!(
            "talkback: recording with preset '{}' — press Ctrl-C to stop",
            config.stt.preset
        );
    }

    tokio::signal::ctrl_c().await?;

    controller.stop()?;

    finish_transcript(&controller.transcript(), &opts)?;
    Ok(())
}

/// Pipe mode: transcribe WAV data from stdin, chunk by chunk, in order.
pub async fn run_pipe_command(mut config: Config, opts: SessionOptions) -> Result<()> {
    opts.merge_into(&mut config);

    ensure_model(config.stt.preset, opts.no_download, opts.quiet).await?;

    let engine = build_engine(&config);
    let handle = engine.ensure(config.stt.preset)?;

    let source = WavAudioSource::from_stdin(config.audio.frame_size)?;
    let samples = source.into_samples();

    let mut chunker = Chunker::new(config.audio.chunk_secs, config.audio.sample_rate)?;
    let transcript = Transcript::new();
    let mut sinks: Vec<Box<dyn ResultSink>> = vec![
        cli_sink(opts.json, opts.quiet),
        Box::new(TranscriptSink::new(transcript.clone())),
    ];

    // Offline input: no capture thread to protect, so chunks are
    // transcribed sequentially — ordering is free.
    for chunk in chunker.feed(&samples) {
        let text = handle.transcribe(&chunk.samples)?;
        let event = SessionEvent::Result(TranscriptionResult {
            sequence: chunk.sequence,
            text,
            is_final: true,
            captured_at_ms: 0,
        });
        for sink in &mut sinks {
            if let Err(e) = sink.publish(&event) {
                eprintln!("talkback: [{}] {e}", sink.name());
            }
        }
    }

    finish_transcript(&transcript, &opts)?;
    Ok(())
}

fn finish_transcript(transcript: &Transcript, opts: &SessionOptions) -> Result<()> {
    if let Some(path) = &opts.output {
        transcript.export(path)?;
        if !opts.quiet {
            eprintln!("talkback: transcript written to {}", path.display());
        }
    }
    Ok(())
}

/// Speak text through the configured TTS command; Ctrl-C cancels playback.
pub async fn run_speak_command(
    config: Config,
    text: String,
    tts_command: Option<String>,
) -> Result<()> {
    let program = tts_command.unwrap_or_else(|| config.tts.command.clone());
    let synthesizer = Arc::new(CommandSynthesizer::new(&program, config.tts.args.clone()));

    let speaker = Arc::clone(&synthesizer);
    let playback = tokio::task::spawn_blocking(move || speaker.speak(&text));

    tokio::select! {
        result = playback => result??,
        _ = tokio::signal::ctrl_c() => {
            synthesizer.cancel();
            eprintln!("talkback: speech cancelled");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_merge_overrides_config() {
        let mut config = Config::default();
        let opts = SessionOptions {
            device: Some("hw:1".to_string()),
            preset: Some(ModelPreset::Tiny),
            language: Some("en".to_string()),
            chunk_secs: Some(1.5),
            workers: Some(4),
            watchdog: Some(Duration::from_secs(12)),
            ..Default::default()
        };
        opts.merge_into(&mut config);

        assert_eq!(config.audio.device.as_deref(), Some("hw:1"));
        assert_eq!(config.stt.preset, ModelPreset::Tiny);
        assert_eq!(config.stt.language, "en");
        assert_eq!(config.audio.chunk_secs, 1.5);
        assert_eq!(config.session.workers, 4);
        assert_eq!(config.session.watchdog_secs, 12);
    }

    #[test]
    fn options_default_leaves_config_untouched() {
        let mut config = Config::default();
        let before = config.clone();
        SessionOptions::default().merge_into(&mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn session_config_reflects_merged_options() {
        let mut config = Config::default();
        SessionOptions {
            chunk_secs: Some(2.0),
            ..Default::default()
        }
        .merge_into(&mut config);

        let session: crate::session::SessionConfig = config.session_config();
        assert_eq!(session.chunk_secs, 2.0);
    }
}
