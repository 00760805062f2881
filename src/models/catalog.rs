//! Metadata for the Whisper model presets.

use crate::stt::ModelPreset;

/// Metadata for one downloadable model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Preset this model backs
    pub preset: ModelPreset,
    /// On-disk file name
    pub file_name: &'static str,
    /// Approximate download size in megabytes
    pub size_mb: u32,
    /// SHA-1 checksum; empty means no verification
    pub sha1: &'static str,
    /// Download URL
    pub url: &'static str,
}

/// Catalog of preset models, smallest to largest.
///
/// Presets trade inference cost for accuracy: tiny is fast and rough, large
/// is slow and accurate.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        preset: ModelPreset::Tiny,
        file_name: "ggml-tiny.bin",
        size_mb: 75,
        sha1: "",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.bin",
    },
    ModelInfo {
        preset: ModelPreset::Base,
        file_name: "ggml-base.bin",
        size_mb: 142,
        sha1: "",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin",
    },
    ModelInfo {
        preset: ModelPreset::Small,
        file_name: "ggml-small.bin",
        size_mb: 466,
        sha1: "",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin",
    },
    ModelInfo {
        preset: ModelPreset::Medium,
        file_name: "ggml-medium.bin",
        size_mb: 1533,
        sha1: "",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-medium.bin",
    },
    ModelInfo {
        preset: ModelPreset::Large,
        file_name: "ggml-large.bin",
        size_mb: 3094,
        sha1: "",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large.bin",
    },
];

/// Look up catalog metadata for a preset.
pub fn get_model(preset: ModelPreset) -> &'static ModelInfo {
    // The catalog covers every preset variant.
    MODELS
        .iter()
        .find(|m| m.preset == preset)
        .unwrap_or(&MODELS[1])
}

/// All catalog entries.
pub fn list_models() -> &'static [ModelInfo] {
    MODELS
}
