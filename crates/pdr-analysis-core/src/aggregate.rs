//! Merging of per-batch partial results.
//!
//! Succeeded batches contribute their lists in batch order, then in their
//! own order; every other slot contributes nothing. No deduplication or
//! semantic merging happens here: two batches reporting the same missing
//! document yield two entries.

use crate::models::AnalysisResult;
use crate::outcome::BatchSlot;

/// Concatenate the lists of every succeeded slot, in slot order.
pub fn merge(slots: &[BatchSlot]) -> AnalysisResult {
    let mut merged = AnalysisResult::default();

    for partial in slots.iter().filter_map(BatchSlot::partial) {
        merged
            .missing_documents
            .extend(partial.missing_documents.iter().cloned());
        merged
            .recommendations
            .extend(partial.recommendations.iter().cloned());
    }

    merged
}
