//! Text-to-speech: the synthesizer seam and the system-command
//! implementation.

pub mod command;
pub mod synthesizer;

pub use command::CommandSynthesizer;
pub use synthesizer::{MockSynthesizer, Synthesizer};
