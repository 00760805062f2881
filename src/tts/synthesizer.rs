use crate::error::{Result, TalkbackError};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Trait for speech synthesis.
///
/// `speak` blocks the calling thread for the duration of playback and is
/// invoked on explicit user action only — it is independent of any live
/// transcription session. `cancel` stops playback from another thread.
pub trait Synthesizer: Send + Sync {
    /// Speak `text`, blocking until playback completes or is cancelled.
    fn speak(&self, text: &str) -> Result<()>;

    /// Stop playback. Safe to call from any thread, idempotent, and a no-op
    /// when nothing is playing.
    fn cancel(&self);

    /// Name for logging/diagnostics.
    fn name(&self) -> &str {
        "synthesizer"
    }
}

/// Mock synthesizer for testing.
#[derive(Default)]
pub struct MockSynthesizer {
    spoken: Mutex<Vec<String>>,
    block_for: Option<Duration>,
    cancelled: AtomicBool,
    should_fail: bool,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate playback taking `duration` (interruptible by cancel).
    pub fn with_playback(mut self, duration: Duration) -> Self {
        self.block_for = Some(duration);
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Texts spoken so far.
    pub fn spoken(&self) -> Vec<String> {
        match self.spoken.lock() {
            Ok(spoken) => spoken.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Synthesizer for MockSynthesizer {
    fn speak(&self, text: &str) -> Result<()> {
        if self.should_fail {
            return Err(TalkbackError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }
        self.cancelled.store(false, Ordering::SeqCst);
        match self.spoken.lock() {
            Ok(mut spoken) => spoken.push(text.to_string()),
            Err(poisoned) => poisoned.into_inner().push(text.to_string()),
        }
        if let Some(duration) = self.block_for {
            let deadline = Instant::now() + duration;
            while Instant::now() < deadline {
                if self.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "mock"
    }
}
