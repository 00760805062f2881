//! Terminal and JSON rendering of session events.
//!
//! The two built-in CLI sinks live here: a human-readable renderer (colored,
//! transcriptions to stdout, status to stderr) and a JSON-lines event stream
//! for scripting.

use crate::error::Result;
use crate::session::sink::ResultSink;
use crate::session::types::SessionEvent;
use owo_colors::OwoColorize;

/// Render one event for a human.
pub fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::Result(result) => {
            if result.text.trim().is_empty() {
                return;
            }
            println!(
                "{} {}",
                format!("[{:>6.1}s]", result.captured_at_ms as f64 / 1000.0).dimmed(),
                result.text
            );
        }
        SessionEvent::Overrun { sequence } => {
            eprintln!(
                "{}",
                format!("talkback: inference backlog — chunk {sequence} dropped").yellow()
            );
        }
        SessionEvent::Terminated { reason } => {
            eprintln!("{}", format!("talkback: session ended: {reason}").red());
        }
    }
}

/// Sink printing events for a human.
pub struct TerminalSink {
    quiet: bool,
}

impl TerminalSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ResultSink for TerminalSink {
    fn publish(&mut self, event: &SessionEvent) -> Result<()> {
        // Failures still surface when quiet; transcriptions do not.
        match event {
            SessionEvent::Result(_) if self.quiet => {}
            _ => render_event(event),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}

/// Sink printing one JSON object per event to stdout.
pub struct JsonSink;

impl ResultSink for JsonSink {
    fn publish(&mut self, event: &SessionEvent) -> Result<()> {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("talkback: failed to encode event: {e}"),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
