//! Session controller: the orchestration core.
//!
//! Owns the lifecycle of capture → chunker → inference workers → ordered
//! delivery. One thread captures and chunks (nothing else may block it), a
//! small worker pool runs inference, a delivery thread releases results in
//! sequence order through the reorder buffer, and a watchdog terminates the
//! session when capture or inference stops making progress.
//!
//! State machine: Idle → Starting → Running → Stopping → Idle, with
//! Running → Reconfiguring → Running for mid-session changes.

use crate::audio::source::{AudioSource, CloseHandle, SourceFactory};
use crate::chunker::Chunker;
use crate::defaults;
use crate::error::{Result, TalkbackError};
use crate::session::report::{ErrorReporter, StderrReporter};
use crate::session::reorder::ReorderBuffer;
use crate::session::sink::{ResultSink, SinkFanout};
use crate::session::transcript::{Transcript, TranscriptSink};
use crate::session::types::{
    AudioChunk, SessionConfig, SessionEvent, SessionState, SessionUpdate, TranscriptionResult,
};
use crate::stt::TranscriptionEngine;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded, unbounded};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lock a mutex, recovering the inner value if a pipeline thread panicked
/// while holding it.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Messages from the controller to the capture thread.
enum ControlMsg {
    /// Change chunk duration at the next boundary.
    SetChunkSecs(f32),
    /// Replace the audio source; the new source is already open.
    SwapSource(Box<dyn AudioSource>),
}

/// Messages from pipeline threads to the delivery thread.
enum WorkerMsg {
    /// A sequence-slotted event for the reorder buffer.
    Ordered(u64, SessionEvent),
    /// Terminal failure; delivery publishes it and shuts down.
    Terminated(String),
}

/// Progress heartbeats observed by the watchdog.
struct Progress {
    last_frame: Mutex<Instant>,
    last_result: Mutex<Instant>,
    in_flight: AtomicU64,
}

impl Progress {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: Mutex::new(now),
            last_result: Mutex::new(now),
            in_flight: AtomicU64::new(0),
        }
    }

    fn touch_frame(&self) {
        *lock_or_recover(&self.last_frame) = Instant::now();
    }

    fn chunk_dispatched(&self) {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            // First outstanding chunk after an idle stretch: restart the
            // inference clock so stale history cannot trip the watchdog.
            *lock_or_recover(&self.last_result) = Instant::now();
        }
    }

    fn result_delivered(&self) {
        *lock_or_recover(&self.last_result) = Instant::now();
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }

    /// Time since the last sign of progress, if the session counts as
    /// stalled under `timeout`.
    fn stalled_for(&self, timeout: Duration) -> Option<Duration> {
        let frame_elapsed = lock_or_recover(&self.last_frame).elapsed();
        if frame_elapsed > timeout {
            return Some(frame_elapsed);
        }
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            let result_elapsed = lock_or_recover(&self.last_result).elapsed();
            if result_elapsed > timeout {
                return Some(result_elapsed);
            }
        }
        None
    }
}

struct ActiveSession {
    config: SessionConfig,
    stop: Arc<AtomicBool>,
    /// Close handle for the current source; the capture thread swaps it on a
    /// device change.
    close: Arc<Mutex<CloseHandle>>,
    control_tx: Sender<ControlMsg>,
    threads: Vec<JoinHandle<()>>,
}

/// The orchestration core: owns capture, inference, ordered delivery and the
/// session state machine.
pub struct SessionController {
    engine: Arc<TranscriptionEngine>,
    factory: Arc<dyn SourceFactory>,
    reporter: Arc<dyn ErrorReporter>,
    state: Arc<Mutex<SessionState>>,
    transcript: Transcript,
    staged_sinks: Mutex<Vec<Box<dyn ResultSink>>>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionController {
    pub fn new(engine: Arc<TranscriptionEngine>, factory: Arc<dyn SourceFactory>) -> Self {
        Self {
            engine,
            factory,
            reporter: Arc::new(StderrReporter),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            transcript: Transcript::new(),
            staged_sinks: Mutex::new(Vec::new()),
            active: Mutex::new(None),
        }
    }

    /// Use a custom error reporter instead of stderr.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Register a sink for the next session.
    ///
    /// Staged sinks are consumed by `start`; register again before a
    /// subsequent session. The transcript accumulator is always registered.
    pub fn add_sink(&self, sink: Box<dyn ResultSink>) {
        lock_or_recover(&self.staged_sinks).push(sink);
    }

    /// Shared transcript handle; valid across sessions.
    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    /// Export the transcript to `path` (atomic write). Leaves session state
    /// untouched.
    pub fn export_transcript(&self, path: &std::path::Path) -> Result<()> {
        self.transcript.export(path)
    }

    pub fn state(&self) -> SessionState {
        *lock_or_recover(&self.state)
    }

    pub fn engine(&self) -> &Arc<TranscriptionEngine> {
        &self.engine
    }

    /// Start a session.
    ///
    /// Valid only from Idle; fails with `Start{cause}` otherwise or when the
    /// model or device cannot be acquired. On failure every partially
    /// acquired resource is released and the state returns to Idle.
    pub fn start(&self, config: SessionConfig) -> Result<()> {
        {
            let mut state = lock_or_recover(&self.state);
            if *state != SessionState::Idle {
                return Err(TalkbackError::start(TalkbackError::InvalidTransition {
                    operation: "start",
                    state: state.as_str(),
                }));
            }
            *state = SessionState::Starting;
        }

        match self.start_pipeline(config) {
            Ok(session) => {
                *lock_or_recover(&self.active) = Some(session);
                *lock_or_recover(&self.state) = SessionState::Running;
                Ok(())
            }
            Err(cause) => {
                *lock_or_recover(&self.state) = SessionState::Idle;
                Err(TalkbackError::start(cause))
            }
        }
    }

    fn start_pipeline(&self, config: SessionConfig) -> Result<ActiveSession> {
        // Validate chunking before touching the device.
        let chunker = Chunker::new(config.chunk_secs, config.sample_rate)?;

        // Model first: loading is the slow part and needs no unwinding.
        self.engine.ensure(config.preset)?;

        let mut source =
            self.factory
                .create(config.device.as_deref(), config.sample_rate, config.frame_size)?;
        // On failure the source drops here, releasing anything it claimed.
        source.open()?;

        let stop = Arc::new(AtomicBool::new(false));
        let close = Arc::new(Mutex::new(source.close_handle()));
        let progress = Arc::new(Progress::new());
        let epoch = Instant::now();

        let (chunk_tx, chunk_rx) = bounded::<AudioChunk>(config.queue_depth.max(1));
        let (result_tx, result_rx) = unbounded::<WorkerMsg>();
        let (control_tx, control_rx) = unbounded::<ControlMsg>();

        let mut sinks = std::mem::take(&mut *lock_or_recover(&self.staged_sinks));
        sinks.push(Box::new(TranscriptSink::new(self.transcript.clone())));
        let fanout = SinkFanout::spawn(sinks, Arc::clone(&self.reporter));

        let mut threads = Vec::new();

        // Capture + chunking thread. Only read_frame may block it.
        {
            let chunk_tx = chunk_tx.clone();
            let evict_rx = chunk_rx.clone();
            let result_tx = result_tx.clone();
            let stop = Arc::clone(&stop);
            let close = Arc::clone(&close);
            let progress = Arc::clone(&progress);
            let reporter = Arc::clone(&self.reporter);
            threads.push(thread::spawn(move || {
                capture_loop(
                    source, chunker, chunk_tx, evict_rx, result_tx, control_rx, stop, close,
                    progress, reporter,
                );
            }));
        }

        // Inference worker pool.
        for _ in 0..config.effective_workers() {
            let chunk_rx = chunk_rx.clone();
            let result_tx = result_tx.clone();
            let engine = Arc::clone(&self.engine);
            let stop = Arc::clone(&stop);
            let reporter = Arc::clone(&self.reporter);
            threads.push(thread::spawn(move || {
                worker_loop(chunk_rx, result_tx, engine, stop, reporter, epoch);
            }));
        }

        // Watchdog.
        {
            let result_tx = result_tx.clone();
            let stop = Arc::clone(&stop);
            let close = Arc::clone(&close);
            let progress = Arc::clone(&progress);
            let reporter = Arc::clone(&self.reporter);
            let timeout = config.watchdog;
            threads.push(thread::spawn(move || {
                watchdog_loop(progress, timeout, stop, close, result_tx, reporter);
            }));
        }

        // Ordered delivery thread; owns the reorder buffer and the fan-out.
        // Exits when every result sender is gone, then finishes the sinks.
        {
            let state = Arc::clone(&self.state);
            let progress = Arc::clone(&progress);
            drop(result_tx);
            drop(chunk_tx);
            drop(chunk_rx);
            threads.push(thread::spawn(move || {
                delivery_loop(result_rx, fanout, state, progress);
            }));
        }

        Ok(ActiveSession {
            config,
            stop,
            close,
            control_tx,
            threads,
        })
    }

    /// Stop the session.
    ///
    /// Discards queued chunks (bounded stop latency: at most one in-flight
    /// inference call), closes the audio source before returning, and joins
    /// the pipeline threads against a deadline.
    pub fn stop(&self) -> Result<()> {
        let session = {
            let mut active = lock_or_recover(&self.active);
            match active.take() {
                Some(session) => session,
                None => {
                    return Err(TalkbackError::InvalidTransition {
                        operation: "stop",
                        state: self.state().as_str(),
                    });
                }
            }
        };

        *lock_or_recover(&self.state) = SessionState::Stopping;

        session.stop.store(true, Ordering::SeqCst);
        // Wake a capture thread parked in read_frame; this also releases the
        // device buffer immediately.
        lock_or_recover(&session.close).close();
        drop(session.control_tx);

        self.join_with_deadline(session.threads, defaults::STOP_JOIN_DEADLINE);

        *lock_or_recover(&self.state) = SessionState::Idle;
        Ok(())
    }

    /// Join threads, polling so a stuck thread cannot hang stop(); leftovers
    /// are detached and die with the process.
    fn join_with_deadline(&self, mut threads: Vec<JoinHandle<()>>, deadline: Duration) {
        let give_up = Instant::now() + deadline;
        let poll = Duration::from_millis(50);

        loop {
            let mut remaining = Vec::new();
            for handle in threads.drain(..) {
                if handle.is_finished() {
                    if handle.join().is_err() {
                        eprintln!("talkback: session thread panicked");
                    }
                } else {
                    remaining.push(handle);
                }
            }
            threads = remaining;

            if threads.is_empty() {
                return;
            }
            if Instant::now() >= give_up {
                eprintln!(
                    "talkback: stop deadline passed — detaching {} session thread(s)",
                    threads.len()
                );
                return;
            }
            thread::sleep(poll);
        }
    }

    /// Apply a partial configuration change to the running session.
    ///
    /// Chunk duration takes effect at the next chunk boundary. A preset
    /// change swaps the model handle for future dispatches. A device change
    /// opens the new device first and keeps the old one on failure. Sequence
    /// numbering continues across all of these.
    pub fn reconfigure(&self, update: SessionUpdate) -> Result<()> {
        {
            let mut state = lock_or_recover(&self.state);
            if *state != SessionState::Running {
                return Err(TalkbackError::InvalidTransition {
                    operation: "reconfigure",
                    state: state.as_str(),
                });
            }
            *state = SessionState::Reconfiguring;
        }

        let result = self.apply_update(update);

        // Even a partial failure leaves the session running with its
        // previous settings.
        *lock_or_recover(&self.state) = SessionState::Running;
        result
    }

    fn apply_update(&self, update: SessionUpdate) -> Result<()> {
        let mut active = lock_or_recover(&self.active);
        let session = active
            .as_mut()
            .ok_or(TalkbackError::InvalidTransition {
                operation: "reconfigure",
                state: "idle",
            })?;

        if let Some(chunk_secs) = update.chunk_secs {
            if !chunk_secs.is_finite() || chunk_secs <= 0.0 {
                return Err(TalkbackError::ConfigInvalidValue {
                    key: "chunk_secs".to_string(),
                    message: format!("must be a positive number, got {chunk_secs}"),
                });
            }
            let _ = session.control_tx.send(ControlMsg::SetChunkSecs(chunk_secs));
            session.config.chunk_secs = chunk_secs;
        }

        if let Some(preset) = update.preset {
            // Chunks already dispatched keep their old handle alive.
            self.engine.load(preset)?;
            session.config.preset = preset;
        }

        if let Some(device) = update.device {
            let mut source = self.factory.create(
                Some(&device),
                session.config.sample_rate,
                session.config.frame_size,
            )?;
            source.open()?;

            // Grab the old handle before the capture thread can swap it for
            // the new one, then close it to wake a blocked read_frame.
            let old_close = lock_or_recover(&session.close).clone();
            let _ = session.control_tx.send(ControlMsg::SwapSource(source));
            old_close.close();
            session.config.device = Some(device);
        }

        Ok(())
    }
}

fn capture_loop(
    source: Box<dyn AudioSource>,
    chunker: Chunker,
    chunk_tx: Sender<AudioChunk>,
    evict_rx: Receiver<AudioChunk>,
    result_tx: Sender<WorkerMsg>,
    control_rx: Receiver<ControlMsg>,
    stop: Arc<AtomicBool>,
    close: Arc<Mutex<CloseHandle>>,
    progress: Arc<Progress>,
    reporter: Arc<dyn ErrorReporter>,
) {
    let mut source = source;
    let mut chunker = chunker;

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        while let Ok(msg) = control_rx.try_recv() {
            apply_control(msg, &mut source, &mut chunker, &close, &reporter);
        }

        match source.read_frame() {
            Ok(frame) => {
                progress.touch_frame();
                for chunk in chunker.feed(&frame) {
                    enqueue_chunk(chunk, &chunk_tx, &evict_rx, &result_tx, &progress);
                }
            }
            Err(TalkbackError::SourceClosed) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                // A device swap closes the old source to wake us; look for
                // the replacement before treating this as a lost device.
                let mut swapped = false;
                while let Ok(msg) = control_rx.try_recv() {
                    swapped |= apply_control(msg, &mut source, &mut chunker, &close, &reporter);
                }
                if swapped {
                    continue;
                }
                if let Ok(msg) = control_rx.recv_timeout(Duration::from_millis(200))
                    && apply_control(msg, &mut source, &mut chunker, &close, &reporter)
                {
                    continue;
                }
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let _ = result_tx.send(WorkerMsg::Terminated(
                    "audio source closed unexpectedly".to_string(),
                ));
                stop.store(true, Ordering::SeqCst);
                break;
            }
            Err(error) => {
                reporter.report("capture", &error);
                let _ = result_tx.send(WorkerMsg::Terminated(format!(
                    "audio capture failed: {error}"
                )));
                stop.store(true, Ordering::SeqCst);
                break;
            }
        }
    }

    // Dropping the source releases the device before the thread exits.
}

/// Returns true when the message swapped the audio source.
fn apply_control(
    msg: ControlMsg,
    source: &mut Box<dyn AudioSource>,
    chunker: &mut Chunker,
    close: &Arc<Mutex<CloseHandle>>,
    reporter: &Arc<dyn ErrorReporter>,
) -> bool {
    match msg {
        ControlMsg::SetChunkSecs(chunk_secs) => {
            if let Err(error) = chunker.set_chunk_secs(chunk_secs) {
                reporter.report("chunker", &error);
            }
            false
        }
        ControlMsg::SwapSource(new_source) => {
            let old = std::mem::replace(source, new_source);
            old.close_handle().close();
            drop(old);
            *lock_or_recover(close) = source.close_handle();
            true
        }
    }
}

/// Enqueue a chunk, dropping the oldest queued chunk when the queue is full.
/// The dropped sequence is published as an overrun so ordering never stalls.
fn enqueue_chunk(
    chunk: AudioChunk,
    chunk_tx: &Sender<AudioChunk>,
    evict_rx: &Receiver<AudioChunk>,
    result_tx: &Sender<WorkerMsg>,
    progress: &Arc<Progress>,
) {
    progress.chunk_dispatched();
    let mut pending = chunk;
    loop {
        match chunk_tx.try_send(pending) {
            Ok(()) => return,
            Err(TrySendError::Full(returned)) => {
                pending = returned;
                if let Ok(dropped) = evict_rx.try_recv() {
                    let sequence = dropped.sequence;
                    let _ = result_tx
                        .send(WorkerMsg::Ordered(sequence, SessionEvent::Overrun { sequence }));
                }
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
    }
}

fn worker_loop(
    chunk_rx: Receiver<AudioChunk>,
    result_tx: Sender<WorkerMsg>,
    engine: Arc<TranscriptionEngine>,
    stop: Arc<AtomicBool>,
    reporter: Arc<dyn ErrorReporter>,
    epoch: Instant,
) {
    loop {
        // Cooperative cancellation between chunks; an in-flight inference
        // call runs to completion.
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let chunk = match chunk_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let sequence = chunk.sequence;
        let captured_at_ms = chunk
            .captured_at
            .saturating_duration_since(epoch)
            .as_millis() as u64;

        // Clone-per-dispatch: a preset reload mid-flight keeps this handle
        // valid until the call returns.
        let text = match engine.current() {
            Ok(handle) => match handle.transcribe(&chunk.samples) {
                Ok(text) => text,
                Err(error) => {
                    reporter.report("transcribe", &error);
                    String::new()
                }
            },
            Err(error) => {
                reporter.report("transcribe", &error);
                String::new()
            }
        };

        let event = SessionEvent::Result(TranscriptionResult {
            sequence,
            text,
            is_final: true,
            captured_at_ms,
        });
        if result_tx.send(WorkerMsg::Ordered(sequence, event)).is_err() {
            break;
        }
    }
}

fn watchdog_loop(
    progress: Arc<Progress>,
    timeout: Duration,
    stop: Arc<AtomicBool>,
    close: Arc<Mutex<CloseHandle>>,
    result_tx: Sender<WorkerMsg>,
    reporter: Arc<dyn ErrorReporter>,
) {
    let poll = Duration::from_millis(250).min(timeout);
    loop {
        thread::sleep(poll);
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if let Some(waited) = progress.stalled_for(timeout) {
            let error = TalkbackError::StallTimeout {
                waited_ms: waited.as_millis() as u64,
            };
            reporter.report("watchdog", &error);
            let _ = result_tx.send(WorkerMsg::Terminated(error.to_string()));
            stop.store(true, Ordering::SeqCst);
            lock_or_recover(&close).close();
            break;
        }
    }
}

fn delivery_loop(
    result_rx: Receiver<WorkerMsg>,
    fanout: SinkFanout,
    state: Arc<Mutex<SessionState>>,
    progress: Arc<Progress>,
) {
    let mut reorder = ReorderBuffer::new();

    while let Ok(msg) = result_rx.recv() {
        match msg {
            WorkerMsg::Ordered(sequence, event) => {
                progress.result_delivered();
                for ready in reorder.insert(sequence, event) {
                    fanout.publish(&ready);
                }
            }
            WorkerMsg::Terminated(reason) => {
                fanout.publish(&SessionEvent::Terminated { reason });
                *lock_or_recover(&state) = SessionState::Idle;
                break;
            }
        }
    }

    // Results still held in the reorder buffer are discarded: stop policy is
    // bounded latency, not completeness.
    fanout.finish();
}
