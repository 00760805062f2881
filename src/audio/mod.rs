//! Audio capture: source abstraction, cpal microphone capture, WAV parsing.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod source;
pub mod wav;
