//! Model download and installation management.
//!
//! Downloads preset models from HuggingFace into the user's cache directory,
//! verifying integrity when a checksum is known.

use crate::error::{Result, TalkbackError};
use crate::models::catalog::{ModelInfo, get_model};
use crate::stt::ModelPreset;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sha1::{Digest, Sha1};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Directory where models are stored (`~/.cache/talkback/models/`).
pub fn models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("talkback")
        .join("models")
}

/// Full on-disk path for a preset's model file.
pub fn model_path(preset: ModelPreset) -> PathBuf {
    models_dir().join(get_model(preset).file_name)
}

/// Whether a preset's model file is present.
pub fn is_model_installed(preset: ModelPreset) -> bool {
    model_path(preset).exists()
}

/// Download a preset's model if it is not already installed.
///
/// # Errors
/// Fails if the download cannot complete, the checksum mismatches, or the
/// file cannot be written. A corrupt download is removed.
pub async fn download_model(preset: ModelPreset, progress: bool) -> Result<PathBuf> {
    let info = get_model(preset);
    let path = model_path(preset);

    if path.exists() {
        if progress {
            eprintln!(
                "Model '{}' is already installed at {}",
                preset,
                path.display()
            );
        }
        return Ok(path);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| TalkbackError::Other(format!("Failed to create models directory: {e}")))?;
    }

    if progress {
        eprintln!("Downloading {} ({} MB)...", preset, info.size_mb);
    }

    let client = reqwest::Client::new();
    let response = client
        .get(info.url)
        .send()
        .await
        .map_err(|e| TalkbackError::Other(format!("Failed to start download: {e}")))?;

    if !response.status().is_success() {
        return Err(TalkbackError::Other(format!(
            "Download failed with status: {}",
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);

    let pb = if progress {
        let pb = ProgressBar::new(total_size);
        pb.set_style(
            // SAFETY: hardcoded template string — always valid
            #[allow(clippy::expect_used)]
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .expect("hardcoded progress bar template")
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut hasher = Sha1::new();
    let mut stream = response.bytes_stream();
    let mut file = fs::File::create(&path)
        .map_err(|e| TalkbackError::Other(format!("Failed to create output file: {e}")))?;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| TalkbackError::Other(format!("Failed to read download chunk: {e}")))?;

        file.write_all(&chunk)
            .map_err(|e| TalkbackError::Other(format!("Failed to write to file: {e}")))?;

        hasher.update(&chunk);

        if let Some(ref pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message("Downloaded");
    }

    if !info.sha1.is_empty() {
        let calculated = format!("{:x}", hasher.finalize());
        if calculated != info.sha1 {
            if let Err(e) = fs::remove_file(&path) {
                eprintln!("talkback: failed to remove corrupted download: {e}");
            }
            return Err(TalkbackError::Other(format!(
                "SHA-1 checksum mismatch. Expected: {}, got: {}",
                info.sha1, calculated
            )));
        }
        if progress {
            eprintln!("Checksum verified");
        }
    }

    if progress {
        eprintln!("Model installed to: {}", path.display());
    }

    Ok(path)
}

/// Installed presets, smallest first.
pub fn list_installed_models() -> Vec<ModelPreset> {
    ModelPreset::ALL
        .into_iter()
        .filter(|&preset| is_model_installed(preset))
        .collect()
}

/// Format one catalog entry for display.
pub fn format_model_info(info: &ModelInfo) -> String {
    let status = if is_model_installed(info.preset) {
        "[installed]"
    } else {
        "[not installed]"
    };
    format!("{:8} {:5} MB   {}", info.preset.as_str(), info.size_mb, status)
}
