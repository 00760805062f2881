//! The transcription session: controller, ordered delivery, sinks,
//! transcript accumulation.

pub mod controller;
pub mod reorder;
pub mod report;
pub mod sink;
pub mod transcript;
pub mod types;

pub use controller::SessionController;
pub use report::{CollectingReporter, ErrorReporter, StderrReporter};
pub use sink::{ChannelSink, CollectorSink, ResultSink};
pub use transcript::{Transcript, TranscriptSink};
pub use types::{
    AudioChunk, SessionConfig, SessionEvent, SessionState, SessionUpdate, TranscriptionResult,
};
