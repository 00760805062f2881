use crate::defaults;
use crate::session::SessionConfig;
use crate::stt::ModelPreset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(any(feature = "cli", feature = "model-download"))]
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub session: SessionTuning,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub chunk_secs: f32,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub preset: ModelPreset,
    pub language: String,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub command: String,
    pub args: Vec<String>,
}

/// Pipeline tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionTuning {
    /// Inference worker count; 0 derives it from the preset
    pub workers: usize,
    pub queue_depth: usize,
    pub watchdog_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_size: defaults::FRAME_SIZE,
            chunk_secs: defaults::CHUNK_SECS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            preset: defaults::DEFAULT_PRESET,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            command: defaults::TTS_COMMAND.to_string(),
            args: Vec::new(),
        }
    }
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_depth: defaults::QUEUE_DEPTH,
            watchdog_secs: defaults::WATCHDOG.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file falls back to defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - TALKBACK_MODEL → stt.preset
    /// - TALKBACK_LANGUAGE → stt.language
    /// - TALKBACK_AUDIO_DEVICE → audio.device
    /// - TALKBACK_TTS_COMMAND → tts.command
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(preset) = std::env::var("TALKBACK_MODEL")
            && let Ok(preset) = preset.parse::<ModelPreset>()
        {
            self.stt.preset = preset;
        }

        if let Ok(language) = std::env::var("TALKBACK_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = language;
        }

        if let Ok(device) = std::env::var("TALKBACK_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(command) = std::env::var("TALKBACK_TTS_COMMAND")
            && !command.is_empty()
        {
            self.tts.command = command;
        }

        self
    }

    /// Map onto a session configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            device: self.audio.device.clone(),
            preset: self.stt.preset,
            chunk_secs: self.audio.chunk_secs,
            sample_rate: self.audio.sample_rate,
            frame_size: self.audio.frame_size,
            workers: self.session.workers,
            queue_depth: self.session.queue_depth,
            watchdog: Duration::from_secs(self.session.watchdog_secs.max(1)),
        }
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/talkback/config.toml on Linux
    #[cfg(any(feature = "cli", feature = "model-download"))]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("talkback")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Serializes tests that touch process environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: only used in tests with ENV_LOCK held, so no concurrent env access.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_talkback_env() {
        remove_env("TALKBACK_MODEL");
        remove_env("TALKBACK_LANGUAGE");
        remove_env("TALKBACK_AUDIO_DEVICE");
        remove_env("TALKBACK_TTS_COMMAND");
    }

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.frame_size, 1024);
        assert_eq!(config.audio.chunk_secs, 3.0);
        assert_eq!(config.stt.preset, ModelPreset::Base);
        assert_eq!(config.stt.language, "auto");
        assert_eq!(config.tts.command, "espeak-ng");
        assert_eq!(config.session.queue_depth, 16);
    }

    #[test]
    fn load_parses_partial_toml_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[audio]\nchunk_secs = 1.5\n\n[stt]\npreset = \"small\"\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.audio.chunk_secs, 1.5);
        assert_eq!(config.stt.preset, ModelPreset::Small);
        // Untouched sections keep defaults
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.tts.command, "espeak-ng");
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "audio = {{ device").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn load_or_default_missing_file_gives_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/talkback.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_or_default_propagates_parse_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not toml at all = = =").unwrap();
        assert!(Config::load_or_default(file.path()).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_talkback_env();
        set_env("TALKBACK_MODEL", "tiny");
        set_env("TALKBACK_LANGUAGE", "de");
        set_env("TALKBACK_AUDIO_DEVICE", "pipewire");
        set_env("TALKBACK_TTS_COMMAND", "spd-say");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.stt.preset, ModelPreset::Tiny);
        assert_eq!(config.stt.language, "de");
        assert_eq!(config.audio.device.as_deref(), Some("pipewire"));
        assert_eq!(config.tts.command, "spd-say");

        clear_talkback_env();
    }

    #[test]
    fn env_override_ignores_invalid_preset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_talkback_env();
        set_env("TALKBACK_MODEL", "enormous");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.stt.preset, ModelPreset::Base);

        clear_talkback_env();
    }

    #[test]
    fn session_config_mapping() {
        let mut config = Config::default();
        config.audio.chunk_secs = 2.0;
        config.session.workers = 3;
        config.session.watchdog_secs = 7;

        let session = config.session_config();
        assert_eq!(session.chunk_secs, 2.0);
        assert_eq!(session.workers, 3);
        assert_eq!(session.watchdog, Duration::from_secs(7));
        assert_eq!(session.preset, ModelPreset::Base);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config::default();
        config.audio.device = Some("hw:1".to_string());
        config.stt.preset = ModelPreset::Medium;

        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}
