//! Speech synthesis through a system TTS command.
//!
//! Drives an external program (`espeak-ng` by default, `spd-say` and friends
//! configurable) with the text appended as the final argument. Playback is
//! cancellable by killing the child process; a kill is reported as a clean
//! cancellation, not a failure.

use crate::error::{Result, TalkbackError};
use crate::tts::synthesizer::Synthesizer;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
    cancelled: AtomicBool,
}

impl CommandSynthesizer {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            child: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Synthesizer using the default TTS command.
    pub fn system() -> Self {
        Self::new(crate::defaults::TTS_COMMAND, Vec::new())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn spawn(&self, text: &str) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TalkbackError::SynthesisToolNotFound {
                        tool: self.program.clone(),
                    }
                } else {
                    TalkbackError::Synthesis {
                        message: format!("failed to run {}: {}", self.program, e),
                    }
                }
            })
    }
}

impl Synthesizer for CommandSynthesizer {
    fn speak(&self, text: &str) -> Result<()> {
        self.cancelled.store(false, Ordering::SeqCst);

        let child = self.spawn(text)?;
        {
            let mut slot = match self.child.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = Some(child);
        }

        // Poll instead of wait() so cancel() can reach the child through the
        // mutex while we block.
        loop {
            let mut slot = match self.child.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            let Some(child) = slot.as_mut() else {
                return Ok(());
            };

            match child.try_wait() {
                Ok(Some(status)) => {
                    *slot = None;
                    if status.success() || self.cancelled.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    return Err(TalkbackError::Synthesis {
                        message: format!("{} exited with {}", self.program, status),
                    });
                }
                Ok(None) => {
                    // Covers a cancel that raced the spawn before the child
                    // landed in the slot.
                    if self.cancelled.load(Ordering::SeqCst) {
                        let _ = child.kill();
                    }
                }
                Err(e) => {
                    *slot = None;
                    return Err(TalkbackError::Synthesis {
                        message: format!("failed to wait for {}: {}", self.program, e),
                    });
                }
            }
            drop(slot);
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let mut slot = match self.child.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(child) = slot.as_mut() {
            // Kill errors mean the child already exited.
            let _ = child.kill();
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}
