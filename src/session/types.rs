//! Data types for the transcription session pipeline.

use crate::defaults;
use crate::stt::ModelPreset;
use serde::Serialize;
use std::time::{Duration, Instant};

/// A fixed-duration segment of captured audio, immutable once emitted by the
/// chunker. Owned by the pipeline until a worker claims it.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Gapless, strictly increasing within one session.
    pub sequence: u64,
    /// Capture time of the chunk's first sample.
    pub captured_at: Instant,
    /// PCM samples (16-bit signed integers).
    pub samples: Vec<i16>,
}

/// The transcription of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptionResult {
    pub sequence: u64,
    /// Recognized text; possibly empty.
    pub text: String,
    /// Always true today — each chunk's result is final, there is no
    /// streaming refinement.
    pub is_final: bool,
    /// Capture time of the chunk, in milliseconds since session start.
    pub captured_at_ms: u64,
}

/// What sinks receive, in sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A chunk's transcription.
    Result(TranscriptionResult),
    /// A chunk was dropped under backpressure; its sequence slot is filled
    /// by this event so ordered delivery never stalls.
    Overrun { sequence: u64 },
    /// The session ended abnormally (device lost, watchdog stall). Terminal.
    Terminated { reason: String },
}

impl SessionEvent {
    /// Sequence slot this event occupies, if it is sequence-ordered.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            SessionEvent::Result(result) => Some(result.sequence),
            SessionEvent::Overrun { sequence } => Some(*sequence),
            SessionEvent::Terminated { .. } => None,
        }
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Reconfiguring,
    Stopping,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Reconfiguring => "reconfiguring",
            SessionState::Stopping => "stopping",
        }
    }
}

/// Configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Input device name; None selects the default device.
    pub device: Option<String>,
    pub preset: ModelPreset,
    /// Chunk duration in seconds; must be positive.
    pub chunk_secs: f32,
    pub sample_rate: u32,
    /// Capture frame size in samples.
    pub frame_size: usize,
    /// Inference worker count; 0 derives it from the preset weight.
    pub workers: usize,
    /// Chunk queue depth before the overrun policy kicks in.
    pub queue_depth: usize,
    /// Watchdog timeout for stalled capture or inference.
    pub watchdog: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: None,
            preset: defaults::DEFAULT_PRESET,
            chunk_secs: defaults::CHUNK_SECS,
            sample_rate: defaults::SAMPLE_RATE,
            frame_size: defaults::FRAME_SIZE,
            workers: 0,
            queue_depth: defaults::QUEUE_DEPTH,
            watchdog: defaults::WATCHDOG,
        }
    }
}

impl SessionConfig {
    /// Worker count after resolving the preset-derived default.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            defaults::workers_for(self.preset)
        } else {
            self.workers
        }
    }
}

/// A partial configuration change applied to a running session.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    /// Switch to this input device.
    pub device: Option<String>,
    /// Switch to this model preset.
    pub preset: Option<ModelPreset>,
    /// New chunk duration, effective at the next chunk boundary.
    pub chunk_secs: Option<f32>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.device.is_none() && self.preset.is_none() && self.chunk_secs.is_none()
    }
}
