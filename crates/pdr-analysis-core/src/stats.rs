//! Run statistics.

use std::time::Duration;

use crate::models::AnalysisStats;
use crate::outcome::ScheduleOutcome;

/// Build the [`AnalysisStats`] for a finished run.
///
/// `total_chunks` is the caller's input count, not anything derived from
/// batching; `total_batches` is what the planner-adjusted batcher produced.
/// `ai_calls` counts every dispatched invocation, so failed and abandoned
/// calls are included.
pub fn record_run(
    total_chunks: usize,
    total_batches: usize,
    outcome: &ScheduleOutcome,
    elapsed: Duration,
) -> AnalysisStats {
    AnalysisStats {
        total_chunks,
        total_batches,
        ai_calls: outcome.dispatched(),
        duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        failed_batches: outcome.failed(),
        abandoned_batches: outcome.abandoned(),
        timed_out: outcome.timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{create_chunk_batches, BatchConstraints};
    use crate::models::{Chunk, PartialResult};
    use crate::outcome::BatchSlot;

    #[test]
    fn test_record_run() {
        let chunks: Vec<Chunk> = (1..=7).map(|i| Chunk::new(i, i, "abc")).collect();
        let batches = create_chunk_batches(&chunks, BatchConstraints::new(2, 100)).unwrap();
        assert_eq!(batches.len(), 4);

        let outcome = ScheduleOutcome {
            slots: vec![
                BatchSlot::Succeeded(PartialResult::default()),
                BatchSlot::Failed("503".into()),
                BatchSlot::Abandoned,
                BatchSlot::Pending,
            ],
            timed_out: true,
        };
        let stats = record_run(chunks.len(), batches.len(), &outcome, Duration::from_millis(1234));

        assert_eq!(stats.total_chunks, 7);
        assert_eq!(stats.total_batches, 4);
        assert_eq!(stats.ai_calls, 3);
        assert_eq!(stats.failed_batches, 1);
        assert_eq!(stats.abandoned_batches, 1);
        assert_eq!(stats.duration_ms, 1234);
        assert!(stats.timed_out);
    }

    #[test]
    fn test_record_empty_run() {
        let outcome = ScheduleOutcome {
            slots: vec![],
            timed_out: false,
        };
        let stats = record_run(0, 0, &outcome, Duration::ZERO);
        assert_eq!(stats, AnalysisStats::default());
    }
}
