//! Reorder buffer for sequence-ordered result delivery.
//!
//! Inference workers complete chunks in arbitrary order; sinks must see
//! results in chunk order. Out-of-order arrivals are held here until every
//! lower-numbered slot has been released.

use crate::session::types::SessionEvent;
use std::collections::BTreeMap;

pub struct ReorderBuffer {
    next_sequence: u64,
    pending: BTreeMap<u64, SessionEvent>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self {
            next_sequence: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Accept an event for `sequence` and return every event that is now
    /// releasable, in order.
    ///
    /// An event below the release point is stale (already released or
    /// superseded) and is discarded.
    pub fn insert(&mut self, sequence: u64, event: SessionEvent) -> Vec<SessionEvent> {
        if sequence < self.next_sequence {
            return Vec::new();
        }
        self.pending.insert(sequence, event);

        let mut released = Vec::new();
        while let Some(event) = self.pending.remove(&self.next_sequence) {
            released.push(event);
            self.next_sequence += 1;
        }
        released
    }

    /// Sequence number the next release is waiting on.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Events held back waiting for predecessors.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::TranscriptionResult;

    fn result(sequence: u64) -> SessionEvent {
        SessionEvent::Result(TranscriptionResult {
            sequence,
            text: format!("r{sequence}"),
            is_final: true,
            captured_at_ms: 0,
        })
    }

    fn sequences(events: &[SessionEvent]) -> Vec<u64> {
        events.iter().filter_map(|e| e.sequence()).collect()
    }

    #[test]
    fn releases_in_order_arrivals_immediately() {
        let mut buffer = ReorderBuffer::new();
        assert_eq!(sequences(&buffer.insert(0, result(0))), vec![0]);
        assert_eq!(sequences(&buffer.insert(1, result(1))), vec![1]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn holds_out_of_order_until_gap_fills() {
        let mut buffer = ReorderBuffer::new();

        // Chunk 1 finishes inference before chunk 0.
        assert!(buffer.insert(1, result(1)).is_empty());
        assert_eq!(buffer.pending_len(), 1);

        let released = buffer.insert(0, result(0));
        assert_eq!(sequences(&released), vec![0, 1]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn releases_long_runs_after_late_head() {
        let mut buffer = ReorderBuffer::new();
        for sequence in [3u64, 1, 2, 4] {
            assert!(buffer.insert(sequence, result(sequence)).is_empty());
        }
        let released = buffer.insert(0, result(0));
        assert_eq!(sequences(&released), vec![0, 1, 2, 3, 4]);
        assert_eq!(buffer.next_sequence(), 5);
    }

    #[test]
    fn overrun_fills_its_slot() {
        let mut buffer = ReorderBuffer::new();
        assert!(buffer.insert(1, result(1)).is_empty());

        // Chunk 0 was dropped under backpressure; the overrun event releases
        // the run.
        let released = buffer.insert(0, SessionEvent::Overrun { sequence: 0 });
        assert_eq!(sequences(&released), vec![0, 1]);
        assert!(matches!(released[0], SessionEvent::Overrun { sequence: 0 }));
    }

    #[test]
    fn stale_sequence_is_discarded() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(0, result(0));
        assert!(buffer.insert(0, result(0)).is_empty());
        assert_eq!(buffer.next_sequence(), 1);
    }
}
