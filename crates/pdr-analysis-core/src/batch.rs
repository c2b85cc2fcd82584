//! Greedy chunk batcher.
//!
//! Groups sequential [`Chunk`]s into [`Batch`]es so that each inference
//! call stays within a chunk-count and a character-count limit.
//!
//! # Algorithm
//!
//! 1. Start with an empty accumulator.
//! 2. An empty accumulator always takes the next chunk, so a chunk that is
//!    larger than `max_characters_per_call` on its own still makes progress.
//! 3. A non-empty accumulator takes the next chunk only if both the chunk
//!    count and the character total stay within their limits; otherwise the
//!    accumulator is closed as a batch and a new one starts with the chunk.
//! 4. The final non-empty accumulator is closed after the loop.
//!
//! The pass is deterministic: the same chunks and constraints always yield
//! the same batch boundaries. The planner and the result cache both rely on
//! that.
//!
//! # Example
//!
//! ```rust
//! use pdr_analysis_core::batch::{create_chunk_batches, BatchConstraints};
//! use pdr_analysis_core::models::Chunk;
//!
//! let chunks: Vec<Chunk> = (1..=5)
//!     .map(|i| Chunk::new(i, i, "x".repeat(1000)))
//!     .collect();
//! let batches = create_chunk_batches(&chunks, BatchConstraints::new(2, 2500)).unwrap();
//! let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
//! assert_eq!(sizes, vec![2, 2, 1]);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::models::Chunk;

/// Per-call limits for one inference invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchConstraints {
    pub max_chunks_per_call: usize,
    pub max_characters_per_call: usize,
}

impl BatchConstraints {
    pub fn new(max_chunks_per_call: usize, max_characters_per_call: usize) -> Self {
        Self {
            max_chunks_per_call,
            max_characters_per_call,
        }
    }

    /// Reject zero limits.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.max_chunks_per_call == 0 {
            return Err(AnalysisError::invalid_constraints(
                "max_chunks_per_call must be greater than zero",
            ));
        }
        if self.max_characters_per_call == 0 {
            return Err(AnalysisError::invalid_constraints(
                "max_characters_per_call must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// An ordered, non-empty run of chunks sent together in one inference call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Position of this batch in the batch sequence (0-based).
    pub index: usize,
    pub chunks: Vec<Chunk>,
    /// Sum of the chunks' character lengths.
    pub char_count: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Inclusive page span covered by this batch.
    pub fn page_range(&self) -> Option<(i64, i64)> {
        let first = self.chunks.iter().map(|c| c.page).min()?;
        let last = self.chunks.iter().map(|c| c.page).max()?;
        Some((first, last))
    }
}

/// Partition `chunks` into batches that respect `constraints`.
///
/// # Guarantees
///
/// - Concatenating the batches reproduces `chunks` exactly, in order.
/// - No batch holds more than `max_chunks_per_call` chunks.
/// - Any batch with more than one chunk holds at most
///   `max_characters_per_call` characters.
/// - An oversized chunk is placed alone in its own batch, never split or
///   dropped.
/// - Empty input yields no batches.
///
/// # Errors
///
/// [`AnalysisError::InvalidConstraints`] if either limit is zero.
pub fn create_chunk_batches(
    chunks: &[Chunk],
    constraints: BatchConstraints,
) -> Result<Vec<Batch>, AnalysisError> {
    constraints.validate()?;

    let mut batches = Vec::new();
    let mut current: Vec<Chunk> = Vec::new();
    let mut current_chars = 0usize;

    for chunk in chunks {
        let chunk_len = chunk.char_len();

        if !current.is_empty() {
            let exceeds_count = current.len() + 1 > constraints.max_chunks_per_call;
            let exceeds_chars = current_chars + chunk_len > constraints.max_characters_per_call;
            if exceeds_count || exceeds_chars {
                batches.push(close_batch(batches.len(), &mut current, current_chars));
                current_chars = 0;
            }
        }

        current.push(chunk.clone());
        current_chars += chunk_len;
    }

    if !current.is_empty() {
        batches.push(close_batch(batches.len(), &mut current, current_chars));
    }

    Ok(batches)
}

/// Count the batches [`create_chunk_batches`] would produce without
/// cloning any chunk content.
pub fn count_batches(chunks: &[Chunk], constraints: BatchConstraints) -> Result<usize, AnalysisError> {
    constraints.validate()?;

    let mut count = 0usize;
    let mut len = 0usize;
    let mut chars = 0usize;

    for chunk in chunks {
        let chunk_len = chunk.char_len();
        if len > 0
            && (len + 1 > constraints.max_chunks_per_call
                || chars + chunk_len > constraints.max_characters_per_call)
        {
            count += 1;
            len = 0;
            chars = 0;
        }
        len += 1;
        chars += chunk_len;
    }

    if len > 0 {
        count += 1;
    }
    Ok(count)
}

fn close_batch(index: usize, current: &mut Vec<Chunk>, char_count: usize) -> Batch {
    Batch {
        index,
        chunks: std::mem::take(current),
        char_count,
    }
}
