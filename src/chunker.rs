//! Fixed-duration chunk accumulation.
//!
//! The chunker turns a stream of capture frames into uniformly sized
//! [`AudioChunk`]s. Boundaries are hard cuts with no overlap; that trades a
//! little accuracy at chunk edges for predictable latency. A duration change
//! never truncates the chunk being accumulated — it takes effect at the next
//! boundary.

use crate::error::{Result, TalkbackError};
use crate::session::types::AudioChunk;
use std::time::Instant;

pub struct Chunker {
    sample_rate: u32,
    chunk_len: usize,
    /// Applied when the current buffer resets.
    pending_chunk_len: Option<usize>,
    buffer: Vec<i16>,
    chunk_started: Option<Instant>,
    next_sequence: u64,
}

impl Chunker {
    pub fn new(chunk_secs: f32, sample_rate: u32) -> Result<Self> {
        let chunk_len = Self::samples_for(chunk_secs, sample_rate)?;
        Ok(Self {
            sample_rate,
            chunk_len,
            pending_chunk_len: None,
            buffer: Vec::with_capacity(chunk_len),
            chunk_started: None,
            next_sequence: 0,
        })
    }

    fn samples_for(chunk_secs: f32, sample_rate: u32) -> Result<usize> {
        if !chunk_secs.is_finite() || chunk_secs <= 0.0 {
            return Err(TalkbackError::ConfigInvalidValue {
                key: "chunk_secs".to_string(),
                message: format!("must be a positive number, got {chunk_secs}"),
            });
        }
        let samples = (chunk_secs as f64 * sample_rate as f64).round() as usize;
        Ok(samples.max(1))
    }

    /// Current chunk length in samples.
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Samples accumulated toward the current chunk.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Sequence number the next emitted chunk will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Change the chunk duration.
    ///
    /// Takes effect at the next chunk boundary; an in-progress buffer keeps
    /// its original length. Applies immediately when the buffer is empty.
    pub fn set_chunk_secs(&mut self, chunk_secs: f32) -> Result<()> {
        let chunk_len = Self::samples_for(chunk_secs, self.sample_rate)?;
        if self.buffer.is_empty() {
            self.chunk_len = chunk_len;
            self.pending_chunk_len = None;
        } else {
            self.pending_chunk_len = Some(chunk_len);
        }
        Ok(())
    }

    /// Feed a frame of samples, returning every chunk it completes.
    ///
    /// A frame larger than the space remaining in the current chunk can
    /// complete several chunks at once.
    pub fn feed(&mut self, frame: &[i16]) -> Vec<AudioChunk> {
        let mut chunks = Vec::new();
        let mut remaining = frame;

        while !remaining.is_empty() {
            if self.buffer.is_empty() {
                self.chunk_started = Some(Instant::now());
            }

            let space = self.chunk_len - self.buffer.len();
            let take = space.min(remaining.len());
            self.buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];

            if self.buffer.len() == self.chunk_len {
                chunks.push(self.emit());
            }
        }

        chunks
    }

    fn emit(&mut self) -> AudioChunk {
        let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_len));
        let captured_at = self.chunk_started.take().unwrap_or_else(Instant::now);
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if let Some(chunk_len) = self.pending_chunk_len.take() {
            self.chunk_len = chunk_len;
        }

        AudioChunk {
            sequence,
            captured_at,
            samples,
        }
    }
}
