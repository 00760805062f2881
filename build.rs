//! Build script: embeds the git hash and sanity-checks GPU toolkits before
//! whisper-rs-sys starts compiling, so a missing toolkit fails fast with a
//! readable message instead of a wall of nvcc errors.

use std::process::Command;

fn main() {
    // Embed git short hash for version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "cuda") {
        require_tool(
            "nvcc",
            &["--version"],
            "CUDA toolkit not found. Install from https://developer.nvidia.com/cuda-downloads\n\
             or build without CUDA: cargo build --release",
        );
    }
    if cfg!(feature = "vulkan") {
        require_tool(
            "vulkaninfo",
            &["--summary"],
            "Vulkan SDK not found. Install from https://vulkan.lunarg.com/\n\
             or build without Vulkan: cargo build --release",
        );
    }
    if cfg!(feature = "hipblas") {
        require_tool(
            "rocminfo",
            &[],
            "ROCm not found. Install from https://rocm.docs.amd.com/\n\
             or build without HipBLAS: cargo build --release",
        );
    }
}

/// Probe for an external tool, panicking with guidance if it is missing.
fn require_tool(tool: &str, args: &[&str], help: &str) {
    if Command::new(tool).args(args).output().is_err() {
        panic!("\n\n`{tool}` not found.\n{help}\n");
    }
    println!("cargo::warning={tool} detected");
}
