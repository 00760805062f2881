//! talkback - Real-time microphone transcription with text-to-speech playback
//!
//! Captures live audio, segments it into fixed-duration chunks, transcribes
//! each chunk through a Whisper-class model, and delivers results to any
//! number of sinks in strict chunk order — with start/stop/reconfigure safe
//! at any point.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod chunker;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod models;
#[cfg(feature = "cli")]
pub mod output;
pub mod session;
pub mod stt;
pub mod tts;

// L4 composition root - needs everything
#[cfg(all(feature = "cpal-audio", feature = "model-download", feature = "cli"))]
pub mod app;

// Core traits (source → transcribe → sink)
pub use audio::source::{AudioSource, SourceFactory};
pub use session::sink::ResultSink;
pub use stt::Transcriber;
pub use tts::Synthesizer;

// Session orchestration
pub use chunker::Chunker;
pub use session::{
    SessionConfig, SessionController, SessionEvent, SessionState, SessionUpdate, Transcript,
    TranscriptionResult,
};
pub use stt::{ModelPreset, TranscriptionEngine};

// Error handling
pub use error::{Result, TalkbackError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.1+abc1234"` when git hash is available, `"0.3.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }
}
