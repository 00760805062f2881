//! Audio source abstraction.
//!
//! An [`AudioSource`] claims one input device and hands out fixed-size frames
//! of 16-bit PCM. Closing is decoupled from reading: a [`CloseHandle`] can be
//! closed from any thread and wakes a blocked `read_frame` immediately, which
//! is what lets the session controller stop a capture loop that is parked on
//! a quiet microphone.

use crate::error::{Result, TalkbackError};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// Trait for audio input sources.
///
/// Implementations: cpal microphone capture, WAV file playback, scripted
/// test sources.
pub trait AudioSource: Send {
    /// Claim the device and begin capturing.
    ///
    /// Fails with `DeviceUnavailable` if the device cannot be claimed and
    /// `UnsupportedFormat` if it cannot deliver the configured format.
    fn open(&mut self) -> Result<()>;

    /// Read the next frame.
    ///
    /// Blocks until a full frame of samples is available, or fails with
    /// `SourceClosed` once the source has been closed.
    fn read_frame(&mut self) -> Result<Vec<i16>>;

    /// Handle for closing this source from another thread.
    fn close_handle(&self) -> CloseHandle;

    /// Whether this source is a live device (as opposed to a finite file).
    fn is_live(&self) -> bool {
        true
    }
}

/// Shared close handle for an audio source.
///
/// Cloneable and thread-safe; `close` is idempotent and wakes any reader
/// blocked in `read_frame`.
#[derive(Clone)]
pub struct CloseHandle {
    buffer: Arc<FrameBuffer>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.buffer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }
}

/// Sample buffer shared between a producer (device callback, file reader,
/// test script) and the consuming `read_frame` call.
///
/// Capped: once `max_samples` is exceeded the oldest samples are discarded,
/// so a stalled consumer cannot grow the buffer without bound.
pub struct FrameBuffer {
    state: Mutex<BufferState>,
    available: Condvar,
    max_samples: usize,
}

struct BufferState {
    samples: VecDeque<i16>,
    /// Producer reached end of stream; drain what is buffered, then fail.
    finished: bool,
    /// Hard close; readers fail immediately.
    closed: bool,
}

impl FrameBuffer {
    pub fn new(max_samples: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BufferState {
                samples: VecDeque::new(),
                finished: false,
                closed: false,
            }),
            available: Condvar::new(),
            max_samples,
        })
    }

    /// Append captured samples, discarding the oldest on overflow.
    pub fn push(&self, samples: &[i16]) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.closed {
            return;
        }
        state.samples.extend(samples.iter().copied());
        let excess = state.samples.len().saturating_sub(self.max_samples);
        if excess > 0 {
            state.samples.drain(..excess);
        }
        self.available.notify_all();
    }

    /// Mark end of stream; buffered samples remain readable.
    pub fn finish(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.finished = true;
        self.available.notify_all();
    }

    /// Close the buffer; any blocked reader wakes with `SourceClosed`.
    pub fn close(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.closed = true;
        state.samples.clear();
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.closed,
            Err(poisoned) => poisoned.into_inner().closed,
        }
    }

    /// Block until `frame_size` samples can be taken, the stream finishes
    /// with fewer samples left, or the buffer is closed.
    pub fn read_exact(&self, frame_size: usize) -> Result<Vec<i16>> {
        let mut state = self.state.lock().map_err(|_| TalkbackError::Capture {
            message: "audio buffer lock poisoned".to_string(),
        })?;
        loop {
            if state.closed {
                return Err(TalkbackError::SourceClosed);
            }
            if state.samples.len() >= frame_size {
                let frame: Vec<i16> = state.samples.drain(..frame_size).collect();
                return Ok(frame);
            }
            if state.finished {
                // Partial tail is discarded; chunk boundaries are hard cuts.
                return Err(TalkbackError::SourceClosed);
            }
            state = self
                .available
                .wait(state)
                .map_err(|_| TalkbackError::Capture {
                    message: "audio buffer lock poisoned".to_string(),
                })?;
        }
    }

    pub fn close_handle(self: &Arc<Self>) -> CloseHandle {
        CloseHandle {
            buffer: Arc::clone(self),
        }
    }
}

/// Factory for audio sources, keyed by device name.
///
/// The session controller opens sources through this seam so device changes
/// mid-session (and tests) do not depend on real hardware.
pub trait SourceFactory: Send + Sync {
    fn create(
        &self,
        device: Option<&str>,
        sample_rate: u32,
        frame_size: usize,
    ) -> Result<Box<dyn AudioSource>>;
}

/// Scripted audio source for tests.
///
/// Plays back a fixed sample script, then either blocks like a quiet
/// microphone until closed (default) or finishes like a file source.
pub struct ScriptedAudioSource {
    frame_size: usize,
    script: Vec<i16>,
    finite: bool,
    fail_open: Option<TalkbackError>,
    buffer: Arc<FrameBuffer>,
}

impl ScriptedAudioSource {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            script: Vec::new(),
            finite: false,
            fail_open: None,
            buffer: FrameBuffer::new(usize::MAX),
        }
    }

    /// Append samples to the playback script.
    pub fn with_samples(mut self, samples: Vec<i16>) -> Self {
        self.script.extend(samples);
        self
    }

    /// Append `count` frames of a constant sample value.
    pub fn with_frames(mut self, value: i16, count: usize) -> Self {
        self.script
            .extend(std::iter::repeat_n(value, self.frame_size * count));
        self
    }

    /// End the stream after the script instead of blocking.
    pub fn finite(mut self) -> Self {
        self.finite = true;
        self
    }

    /// Fail `open` with the given error.
    pub fn with_open_failure(mut self, error: TalkbackError) -> Self {
        self.fail_open = Some(error);
        self
    }

    /// Handle for feeding samples after the source has been handed off.
    pub fn feeder(&self) -> SourceFeeder {
        SourceFeeder {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Feeds a [`ScriptedAudioSource`] from outside the capture thread.
#[derive(Clone)]
pub struct SourceFeeder {
    buffer: Arc<FrameBuffer>,
}

impl SourceFeeder {
    pub fn push(&self, samples: &[i16]) {
        self.buffer.push(samples);
    }

    pub fn finish(&self) {
        self.buffer.finish();
    }
}

impl AudioSource for ScriptedAudioSource {
    fn open(&mut self) -> Result<()> {
        if let Some(error) = self.fail_open.take() {
            return Err(error);
        }
        self.buffer.push(&self.script);
        if self.finite {
            self.buffer.finish();
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<i16>> {
        self.buffer.read_exact(self.frame_size)
    }

    fn close_handle(&self) -> CloseHandle {
        self.buffer.close_handle()
    }

    fn is_live(&self) -> bool {
        !self.finite
    }
}

/// Factory handing out pre-built scripted sources in order.
///
/// `create` pops the next queued source; an empty queue maps to
/// `DeviceUnavailable`, which is how tests simulate a missing device.
#[derive(Default)]
pub struct ScriptedSourceFactory {
    sources: Mutex<VecDeque<ScriptedAudioSource>>,
}

impl ScriptedSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, source: ScriptedAudioSource) {
        match self.sources.lock() {
            Ok(mut sources) => sources.push_back(source),
            Err(poisoned) => poisoned.into_inner().push_back(source),
        }
    }
}

impl SourceFactory for ScriptedSourceFactory {
    fn create(
        &self,
        device: Option<&str>,
        _sample_rate: u32,
        _frame_size: usize,
    ) -> Result<Box<dyn AudioSource>> {
        let mut sources = self.sources.lock().map_err(|_| TalkbackError::Capture {
            message: "source factory lock poisoned".to_string(),
        })?;
        match sources.pop_front() {
            Some(source) => Ok(Box::new(source)),
            None => Err(TalkbackError::DeviceUnavailable {
                device: device.unwrap_or("default").to_string(),
            }),
        }
    }
}
