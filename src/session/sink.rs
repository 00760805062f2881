//! Result sinks and the fan-out that feeds them.
//!
//! Every registered sink receives every session event, in order, on its own
//! thread. A slow sink only delays itself; a failing sink is reported and the
//! rest keep receiving.

use crate::error::{Result, TalkbackError};
use crate::session::report::ErrorReporter;
use crate::session::types::SessionEvent;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Consumer of the ordered session event stream.
///
/// `publish` is called once per event, in sequence order. It runs on the
/// sink's own thread, so blocking here delays only this sink.
pub trait ResultSink: Send + 'static {
    fn publish(&mut self, event: &SessionEvent) -> Result<()>;

    /// Name for logging and failure reports.
    fn name(&self) -> &'static str {
        "sink"
    }

    /// Called once after the last event.
    fn finish(&mut self) {}
}

/// Sink that accumulates every event; test and embedding helper.
pub struct CollectorSink {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the collected events.
    pub fn events_handle(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSink for CollectorSink {
    fn publish(&mut self, event: &SessionEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| TalkbackError::SinkFailure {
                sink: "collector".to_string(),
                message: "event lock poisoned".to_string(),
            })?
            .push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Sink that forwards events into a crossbeam channel.
pub struct ChannelSink {
    tx: Sender<SessionEvent>,
}

impl ChannelSink {
    /// Returns the sink and the receiving end.
    pub fn new() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelSink {
    fn publish(&mut self, event: &SessionEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| TalkbackError::SinkFailure {
                sink: "channel".to_string(),
                message: "receiver dropped".to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Fan-out distributing events to sinks on dedicated threads.
pub struct SinkFanout {
    workers: Vec<SinkWorker>,
}

struct SinkWorker {
    name: &'static str,
    tx: Sender<SessionEvent>,
    handle: JoinHandle<()>,
}

impl SinkFanout {
    /// Spawn one delivery thread per sink.
    pub fn spawn(sinks: Vec<Box<dyn ResultSink>>, reporter: Arc<dyn ErrorReporter>) -> Self {
        let workers = sinks
            .into_iter()
            .map(|mut sink| {
                let name = sink.name();
                let (tx, rx) = unbounded::<SessionEvent>();
                let reporter = Arc::clone(&reporter);
                let handle = std::thread::spawn(move || {
                    while let Ok(event) = rx.recv() {
                        if let Err(error) = sink.publish(&event) {
                            // Isolated: report and keep the sink subscribed.
                            reporter.report(
                                sink.name(),
                                &TalkbackError::SinkFailure {
                                    sink: sink.name().to_string(),
                                    message: error.to_string(),
                                },
                            );
                        }
                    }
                    sink.finish();
                });
                SinkWorker { name, tx, handle }
            })
            .collect();

        Self { workers }
    }

    /// Queue an event to every sink. Never blocks the caller.
    pub fn publish(&self, event: &SessionEvent) {
        for worker in &self.workers {
            // A send only fails if the sink thread is gone; nothing to do.
            let _ = worker.tx.send(event.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Close the queues and wait for the sinks to drain and finish.
    pub fn finish(self) {
        let mut handles = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            drop(worker.tx);
            handles.push((worker.name, worker.handle));
        }
        for (name, handle) in handles {
            if handle.join().is_err() {
                eprintln!("talkback: sink '{name}' thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::report::CollectingReporter;
    use crate::session::types::TranscriptionResult;
    use std::time::Duration;

    fn result(sequence: u64, text: &str) -> SessionEvent {
        SessionEvent::Result(TranscriptionResult {
            sequence,
            text: text.to_string(),
            is_final: true,
            captured_at_ms: 0,
        })
    }

    struct FailingSink;

    impl ResultSink for FailingSink {
        fn publish(&mut self, _event: &SessionEvent) -> Result<()> {
            Err(TalkbackError::Other("sink exploded".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct SlowSink {
        events: Arc<Mutex<Vec<SessionEvent>>>,
    }

    impl ResultSink for SlowSink {
        fn publish(&mut self, event: &SessionEvent) -> Result<()> {
            std::thread::sleep(Duration::from_millis(50));
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[test]
    fn collector_sink_accumulates_events() {
        let mut sink = CollectorSink::new();
        let events = sink.events_handle();

        sink.publish(&result(0, "a")).unwrap();
        sink.publish(&result(1, "b")).unwrap();

        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn channel_sink_forwards_events() {
        let (mut sink, rx) = ChannelSink::new();
        sink.publish(&result(0, "hello")).unwrap();
        assert_eq!(rx.recv().unwrap(), result(0, "hello"));
    }

    #[test]
    fn fanout_delivers_to_every_sink_in_order() {
        let reporter = CollectingReporter::new();
        let collector_a = CollectorSink::new();
        let collector_b = CollectorSink::new();
        let events_a = collector_a.events_handle();
        let events_b = collector_b.events_handle();

        let fanout = SinkFanout::spawn(
            vec![Box::new(collector_a), Box::new(collector_b)],
            reporter,
        );
        assert_eq!(fanout.len(), 2);

        for i in 0..5 {
            fanout.publish(&result(i, "x"));
        }
        fanout.finish();

        for events in [events_a, events_b] {
            let events = events.lock().unwrap();
            let sequences: Vec<u64> = events.iter().filter_map(|e| e.sequence()).collect();
            assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn failing_sink_is_isolated_and_reported() {
        let reporter = CollectingReporter::new();
        let collector = CollectorSink::new();
        let events = collector.events_handle();

        let fanout = SinkFanout::spawn(
            vec![Box::new(FailingSink), Box::new(collector)],
            Arc::clone(&reporter) as Arc<dyn ErrorReporter>,
        );

        fanout.publish(&result(0, "a"));
        fanout.publish(&result(1, "b"));
        fanout.finish();

        // The healthy sink got everything.
        assert_eq!(events.lock().unwrap().len(), 2);

        // Each failure was reported against the failing sink.
        let reports = reporter.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|(stage, _)| stage == "failing"));
        assert!(reports[0].1.contains("sink exploded"));
    }

    #[test]
    fn slow_sink_does_not_stall_fast_sink() {
        let reporter = CollectingReporter::new();
        let slow_events = Arc::new(Mutex::new(Vec::new()));
        let slow = SlowSink {
            events: Arc::clone(&slow_events),
        };
        let fast = CollectorSink::new();
        let fast_events = fast.events_handle();

        let fanout = SinkFanout::spawn(vec![Box::new(slow), Box::new(fast)], reporter);

        let started = std::time::Instant::now();
        for i in 0..4 {
            fanout.publish(&result(i, "x"));
        }
        // Publishing is queue-only, far quicker than the slow sink's 200ms
        // of cumulative work.
        assert!(started.elapsed() < Duration::from_millis(100));

        // Fast sink catches up almost immediately.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while fast_events.lock().unwrap().len() < 4 {
            assert!(std::time::Instant::now() < deadline, "fast sink stalled");
            std::thread::sleep(Duration::from_millis(5));
        }

        fanout.finish();
        assert_eq!(slow_events.lock().unwrap().len(), 4);
    }

    #[test]
    fn finish_runs_sink_finish_hook() {
        struct FinishProbe {
            finished: Arc<Mutex<bool>>,
        }
        impl ResultSink for FinishProbe {
            fn publish(&mut self, _event: &SessionEvent) -> Result<()> {
                Ok(())
            }
            fn finish(&mut self) {
                *self.finished.lock().unwrap() = true;
            }
        }

        let finished = Arc::new(Mutex::new(false));
        let fanout = SinkFanout::spawn(
            vec![Box::new(FinishProbe {
                finished: Arc::clone(&finished),
            })],
            CollectingReporter::new(),
        );
        fanout.finish();
        assert!(*finished.lock().unwrap());
    }
}
