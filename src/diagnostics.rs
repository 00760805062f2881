//! System diagnostics and dependency checking.
//!
//! Verifies that the external tools talkback leans on are installed and
//! usable: the TTS command, audio device enumeration, and the model cache.

use crate::config::Config;
use std::process::Command;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues
    Warning(String),
}

/// Check if a command exists and is executable.
fn check_command(command: &str) -> CheckResult {
    match Command::new(command).arg("--version").output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("'{}' found but --version failed", command)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", command, e)),
    }
}

fn print_check(label: &str, result: CheckResult, install_hint: &str) {
    print!("{label}: ");
    match result {
        CheckResult::Ok => println!("✓ OK"),
        CheckResult::NotFound => {
            println!("✗ NOT FOUND");
            println!("  {install_hint}");
        }
        CheckResult::Warning(msg) => println!("⚠ WARNING: {msg}"),
    }
}

/// Run all dependency checks and print results.
pub fn check_dependencies(config: &Config) {
    println!("Checking system dependencies...\n");

    print_check(
        &format!("{} (text-to-speech)", config.tts.command),
        check_command(&config.tts.command),
        "Install: sudo apt install espeak-ng  (Debian/Ubuntu)\n  \
                  sudo pacman -S espeak-ng    (Arch)",
    );

    #[cfg(feature = "cpal-audio")]
    {
        print!("audio input devices: ");
        match crate::audio::capture::list_devices() {
            Ok(devices) if devices.is_empty() => {
                println!("⚠ WARNING: no input devices found");
            }
            Ok(devices) => println!("✓ OK ({} found)", devices.len()),
            Err(e) => println!("✗ FAILED: {e}"),
        }
    }

    #[cfg(feature = "model-download")]
    {
        let installed = crate::models::download::list_installed_models();
        print!("recognition models: ");
        if installed.is_empty() {
            println!("✗ none installed");
            println!("  Install one: talkback models install base");
        } else {
            let names: Vec<&str> = installed.iter().map(|p| p.as_str()).collect();
            println!("✓ OK ({})", names.join(", "));
        }
    }

    println!();
    println!("GPU backend: {}", crate::defaults::gpu_backend());
}
