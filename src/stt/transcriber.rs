use crate::error::{Result, TalkbackError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for speech-to-text transcription.
///
/// One blocking call per audio chunk; implementations must not mutate shared
/// state beyond internal caches, so a single handle can serve concurrent
/// workers.
pub trait Transcriber: Send + Sync {
    /// Transcribe audio samples to text.
    ///
    /// # Arguments
    /// * `audio` - 16-bit PCM samples at 16kHz mono
    fn transcribe(&self, audio: &[i16]) -> Result<String>;

    /// Name of the loaded model.
    fn model_name(&self) -> &str;

    /// Whether the transcriber is ready for inference.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Implement Transcriber for Arc<T> so handles can be shared across workers.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16]) -> Result<String> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Mock transcriber for testing.
#[derive(Debug)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    delay: Option<Duration>,
    should_fail: bool,
    calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            delay: None,
            should_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Return a specific response from every call.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Sleep for `delay` inside each transcribe call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every transcribe call.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of transcribe calls observed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[i16]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.should_fail {
            Err(TalkbackError::Transcription {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
