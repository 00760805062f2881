//! Error types for talkback.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TalkbackError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device unavailable: {device}")]
    DeviceUnavailable { device: String },

    #[error("Audio format not supported by {device}: {detail}")]
    UnsupportedFormat { device: String, detail: String },

    #[error("Audio source closed")]
    SourceClosed,

    #[error("Audio capture failed: {message}")]
    Capture { message: String },

    // Model errors
    #[error("Model file not found at {path}")]
    ModelNotFound { path: String },

    #[error("Model load failed: {message}")]
    ModelLoad { message: String },

    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    // Session errors
    #[error("Failed to start session: {cause}")]
    Start {
        #[source]
        cause: Box<TalkbackError>,
    },

    #[error("Session stalled: no progress for {waited_ms}ms")]
    StallTimeout { waited_ms: u64 },

    #[error("Cannot {operation} while session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Sink '{sink}' failed: {message}")]
    SinkFailure { sink: String, message: String },

    // Speech synthesis errors
    #[error("Speech synthesis tool not found: {tool}")]
    SynthesisToolNotFound { tool: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl TalkbackError {
    /// Wrap an error as a session start failure.
    pub fn start(cause: TalkbackError) -> Self {
        TalkbackError::Start {
            cause: Box::new(cause),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, TalkbackError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn device_unavailable_display() {
        let error = TalkbackError::DeviceUnavailable {
            device: "hw:2".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device unavailable: hw:2");
    }

    #[test]
    fn unsupported_format_display() {
        let error = TalkbackError::UnsupportedFormat {
            device: "default".to_string(),
            detail: "no 16kHz mono config".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio format not supported by default: no 16kHz mono config"
        );
    }

    #[test]
    fn start_wraps_cause_and_keeps_source() {
        let error = TalkbackError::start(TalkbackError::DeviceUnavailable {
            device: "default".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "Failed to start session: Audio device unavailable: default"
        );
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn stall_timeout_display() {
        let error = TalkbackError::StallTimeout { waited_ms: 30000 };
        assert_eq!(
            error.to_string(),
            "Session stalled: no progress for 30000ms"
        );
    }

    #[test]
    fn invalid_transition_display() {
        let error = TalkbackError::InvalidTransition {
            operation: "start",
            state: "running",
        };
        assert_eq!(error.to_string(), "Cannot start while session is running");
    }

    #[test]
    fn sink_failure_display() {
        let error = TalkbackError::SinkFailure {
            sink: "terminal".to_string(),
            message: "broken pipe".to_string(),
        };
        assert_eq!(error.to_string(), "Sink 'terminal' failed: broken pipe");
    }

    #[test]
    fn synthesis_tool_not_found_display() {
        let error = TalkbackError::SynthesisToolNotFound {
            tool: "espeak-ng".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Speech synthesis tool not found: espeak-ng"
        );
    }

    #[test]
    fn from_io_error_keeps_source_chain() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: TalkbackError = io_error.into();
        assert!(error.to_string().contains("file not found"));
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: TalkbackError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TalkbackError>();
        assert_sync::<TalkbackError>();
    }

    #[test]
    fn result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
