//! Speech-to-text: the transcriber seam, model presets, the preset-loading
//! engine and the Whisper implementation.

pub mod engine;
pub mod transcriber;
pub mod whisper;

pub use engine::{ModelLoader, TranscriptionEngine};
pub use transcriber::{MockTranscriber, Transcriber};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recognition model preset, trading inference cost for accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPreset {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelPreset {
    pub const ALL: [ModelPreset; 5] = [
        ModelPreset::Tiny,
        ModelPreset::Base,
        ModelPreset::Small,
        ModelPreset::Medium,
        ModelPreset::Large,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelPreset::Tiny => "tiny",
            ModelPreset::Base => "base",
            ModelPreset::Small => "small",
            ModelPreset::Medium => "medium",
            ModelPreset::Large => "large",
        }
    }
}

impl fmt::Display for ModelPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiny" => Ok(ModelPreset::Tiny),
            "base" => Ok(ModelPreset::Base),
            "small" => Ok(ModelPreset::Small),
            "medium" => Ok(ModelPreset::Medium),
            "large" => Ok(ModelPreset::Large),
            other => Err(format!(
                "unknown model preset '{other}' (expected tiny, base, small, medium or large)"
            )),
        }
    }
}
