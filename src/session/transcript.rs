//! Ordered transcript accumulation and atomic export.

use crate::error::{Result, TalkbackError};
use crate::session::sink::ResultSink;
use crate::session::types::{SessionEvent, TranscriptionResult};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Append-only, never reordered accumulation of transcription results.
///
/// Cloneable handle; the session's transcript sink appends while the
/// application side reads or exports concurrently.
#[derive(Clone, Default)]
pub struct Transcript {
    results: Arc<Mutex<Vec<TranscriptionResult>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one result. Empty-text results are skipped — they carry no
    /// transcript content.
    pub fn push(&self, result: &TranscriptionResult) {
        if result.text.trim().is_empty() {
            return;
        }
        match self.results.lock() {
            Ok(mut results) => results.push(result.clone()),
            Err(poisoned) => poisoned.into_inner().push(result.clone()),
        }
    }

    /// Transcript lines in sequence order.
    pub fn lines(&self) -> Vec<String> {
        match self.results.lock() {
            Ok(results) => results.iter().map(|r| r.text.clone()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|r| r.text.clone()).collect(),
        }
    }

    /// Whole transcript as one space-joined string.
    pub fn text(&self) -> String {
        self.lines().join(" ")
    }

    pub fn len(&self) -> usize {
        match self.results.lock() {
            Ok(results) => results.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard accumulated results.
    pub fn clear(&self) {
        match self.results.lock() {
            Ok(mut results) => results.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Write the transcript to `path`, one line per result.
    ///
    /// Atomic: written to a temp file in the target directory, then renamed,
    /// so a failure never leaves a partial file behind.
    pub fn export(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| TalkbackError::Other(format!("not a file path: {}", path.display())))?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let tmp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));
        let write_result = (|| -> Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            for line in self.lines() {
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
            Ok(())
        })();

        if let Err(error) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(error);
        }

        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// Sink feeding the shared [`Transcript`].
pub struct TranscriptSink {
    transcript: Transcript,
}

impl TranscriptSink {
    pub fn new(transcript: Transcript) -> Self {
        Self { transcript }
    }
}

impl ResultSink for TranscriptSink {
    fn publish(&mut self, event: &SessionEvent) -> crate::error::Result<()> {
        if let SessionEvent::Result(result) = event {
            self.transcript.push(result);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "transcript"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(sequence: u64, text: &str) -> TranscriptionResult {
        TranscriptionResult {
            sequence,
            text: text.to_string(),
            is_final: true,
            captured_at_ms: 0,
        }
    }

    #[test]
    fn accumulates_in_push_order() {
        let transcript = Transcript::new();
        transcript.push(&result(0, "hello"));
        transcript.push(&result(1, "world"));

        assert_eq!(transcript.lines(), vec!["hello", "world"]);
        assert_eq!(transcript.text(), "hello world");
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn skips_empty_results() {
        let transcript = Transcript::new();
        transcript.push(&result(0, ""));
        transcript.push(&result(1, "   "));
        transcript.push(&result(2, "speech"));

        assert_eq!(transcript.lines(), vec!["speech"]);
    }

    #[test]
    fn clones_share_contents() {
        let transcript = Transcript::new();
        let clone = transcript.clone();
        transcript.push(&result(0, "shared"));
        assert_eq!(clone.lines(), vec!["shared"]);
    }

    #[test]
    fn clear_empties_transcript() {
        let transcript = Transcript::new();
        transcript.push(&result(0, "gone"));
        transcript.clear();
        assert!(transcript.is_empty());
    }

    #[test]
    fn export_writes_one_line_per_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.txt");

        let transcript = Transcript::new();
        transcript.push(&result(0, "first line"));
        transcript.push(&result(1, "second line"));
        transcript.export(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first line\nsecond line\n");
    }

    #[test]
    fn export_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let transcript = Transcript::new();
        transcript.push(&result(0, "line"));
        transcript.export(&path).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["out.txt"]);
    }

    #[test]
    fn export_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "stale contents").unwrap();

        let transcript = Transcript::new();
        transcript.push(&result(0, "fresh"));
        transcript.export(&path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[test]
    fn export_to_missing_directory_fails_with_io_error() {
        let transcript = Transcript::new();
        transcript.push(&result(0, "line"));

        let result = transcript.export(Path::new("/nonexistent-dir-xyz/out.txt"));
        assert!(matches!(result, Err(TalkbackError::Io(_))));
    }

    #[test]
    fn transcript_sink_feeds_shared_transcript() {
        let transcript = Transcript::new();
        let mut sink = TranscriptSink::new(transcript.clone());

        sink.publish(&SessionEvent::Result(result(0, "via sink"))).unwrap();
        sink.publish(&SessionEvent::Overrun { sequence: 1 }).unwrap();

        assert_eq!(transcript.lines(), vec!["via sink"]);
    }
}
