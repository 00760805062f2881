//! Default configuration constants shared across talkback.
//!
//! Collected here so the config file, CLI flags and library defaults stay
//! consistent.

use crate::stt::ModelPreset;
use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard rate for speech recognition and what the Whisper
/// family of models expects.
pub const SAMPLE_RATE: u32 = 16000;

/// Default capture frame size in samples.
///
/// 1024 samples at 16kHz is 64ms per frame, small enough for a responsive
/// chunk boundary, large enough to keep per-frame overhead negligible.
pub const FRAME_SIZE: usize = 1024;

/// Default chunk duration in seconds.
///
/// Each chunk is transcribed independently; 3s balances latency against
/// having enough context for the model to produce usable text.
pub const CHUNK_SECS: f32 = 3.0;

/// Default model preset.
pub const DEFAULT_PRESET: ModelPreset = ModelPreset::Base;

/// Default language code for transcription.
///
/// "auto" lets the model detect the spoken language. Set a specific code
/// (e.g., "en", "de") to force a language.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Default depth of the chunk queue between capture and inference.
///
/// When the queue is full the oldest unconsumed chunk is dropped and an
/// overrun event is published in its place.
pub const QUEUE_DEPTH: usize = 16;

/// Default watchdog timeout.
///
/// If neither a captured frame nor a delivered result is observed for this
/// long while a session is running, the session is terminated as stalled.
pub const WATCHDOG: Duration = Duration::from_secs(30);

/// Deadline for joining session threads during stop().
pub const STOP_JOIN_DEADLINE: Duration = Duration::from_secs(5);

/// Default text-to-speech command.
pub const TTS_COMMAND: &str = "espeak-ng";

/// Inference worker count for a preset.
///
/// Heavier presets get fewer concurrent workers to bound memory; results are
/// reordered before delivery, so extra workers only add throughput.
pub fn workers_for(preset: ModelPreset) -> usize {
    match preset {
        ModelPreset::Tiny | ModelPreset::Base => 2,
        ModelPreset::Small => 2,
        ModelPreset::Medium | ModelPreset::Large => 1,
    }
}

/// Report the GPU backend compiled into this build.
///
/// Only one GPU backend can be active at a time; if none is enabled, returns "CPU".
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else if cfg!(feature = "hipblas") {
        "HipBLAS (AMD)"
    } else if cfg!(feature = "openblas") {
        "OpenBLAS"
    } else {
        "CPU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heavier_presets_get_fewer_workers() {
        assert!(workers_for(ModelPreset::Large) <= workers_for(ModelPreset::Tiny));
        assert_eq!(workers_for(ModelPreset::Large), 1);
    }

    #[test]
    fn gpu_backend_matches_compiled_feature() {
        let expected = if cfg!(feature = "cuda") {
            "CUDA"
        } else if cfg!(feature = "vulkan") {
            "Vulkan"
        } else if cfg!(feature = "hipblas") {
            "HipBLAS (AMD)"
        } else if cfg!(feature = "openblas") {
            "OpenBLAS"
        } else {
            "CPU"
        };
        assert_eq!(gpu_backend(), expected);
    }
}
