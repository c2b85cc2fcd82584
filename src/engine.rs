//! Analysis orchestration.
//!
//! Ties the pure pieces from `pdr-analysis-core` to the async scheduler:
//! plan → batch → schedule → merge → record. One call to
//! [`analyze_document_chunks`] is one orchestration run with its own worker
//! pool and its own statistics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pdr_analysis_core::aggregate::merge;
use pdr_analysis_core::batch::{create_chunk_batches, BatchConstraints};
use pdr_analysis_core::error::AnalysisError;
use pdr_analysis_core::inference::InferenceClient;
use pdr_analysis_core::models::{AnalysisOutcome, AnalysisSpecification, Chunk};
use pdr_analysis_core::outcome::BatchSlot;
use pdr_analysis_core::plan::{plan, CallBudget};
use pdr_analysis_core::stats::record_run;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::scheduler::{self, ScheduleOptions};

/// Per-run knobs for [`analyze_document_chunks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Configured batching limits, before the planner widens them.
    pub constraints: BatchConstraints,
    pub budget: CallBudget,
    pub concurrency_limit: usize,
    /// Overall deadline for the run. `None` waits for every batch.
    pub deadline: Option<Duration>,
}

impl AnalysisOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            constraints: config.batching.constraints(),
            budget: config.batching.budget(),
            concurrency_limit: config.scheduler.concurrency_limit,
            deadline: Some(config.scheduler.deadline()),
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_concurrency(mut self, concurrency_limit: usize) -> Self {
        self.concurrency_limit = concurrency_limit;
        self
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Analyse `chunks` under `specification` with `client`.
///
/// Returns a merged result and run statistics. A deadline that expires
/// mid-run is a partial success with `stats.timed_out` set.
///
/// # Errors
///
/// - [`AnalysisError::InvalidConstraints`] / [`AnalysisError::InvalidConcurrency`]
///   before anything is dispatched.
/// - [`AnalysisError::TotalInferenceFailure`] when every batch failed; it
///   carries the run's statistics.
pub async fn analyze_document_chunks(
    chunks: &[Chunk],
    specification: AnalysisSpecification,
    options: &AnalysisOptions,
    client: Arc<dyn InferenceClient>,
) -> Result<AnalysisOutcome, AnalysisError> {
    analyze_with_progress(chunks, specification, options, client, &NoProgress).await
}

/// [`analyze_document_chunks`] with a progress sink for batch settlement.
pub async fn analyze_with_progress(
    chunks: &[Chunk],
    specification: AnalysisSpecification,
    options: &AnalysisOptions,
    client: Arc<dyn InferenceClient>,
    progress: &dyn ProgressReporter,
) -> Result<AnalysisOutcome, AnalysisError> {
    let started = Instant::now();

    if options.concurrency_limit == 0 {
        return Err(AnalysisError::InvalidConcurrency);
    }
    let effective = plan(chunks, options.constraints, options.budget)?;
    let batches = create_chunk_batches(chunks, effective)?;
    let total_batches = batches.len();

    let run_id = Uuid::new_v4();
    let document_id = specification.document_id;
    let span = info_span!("analysis", %run_id, document_id, client = client.name());

    info!(
        parent: &span,
        chunks = chunks.len(),
        batches = total_batches,
        max_chunks_per_call = effective.max_chunks_per_call,
        max_characters_per_call = effective.max_characters_per_call,
        concurrency = options.concurrency_limit,
        "planned analysis run"
    );
    progress.report(ProgressEvent::Planned {
        document_id,
        total: total_batches,
    });

    let outcome = scheduler::run(
        batches,
        Arc::new(specification),
        client,
        ScheduleOptions::new(options.concurrency_limit, options.deadline),
        progress,
    )
    .instrument(span.clone())
    .await?;

    let stats = record_run(chunks.len(), total_batches, &outcome, started.elapsed());

    if outcome.all_failed() {
        let failures = outcome
            .slots
            .iter()
            .enumerate()
            .filter_map(|(batch_index, slot)| match slot {
                BatchSlot::Failed(message) => Some(AnalysisError::PerBatchInference {
                    batch_index,
                    message: message.clone(),
                }),
                _ => None,
            })
            .collect();
        return Err(AnalysisError::TotalInferenceFailure { failures, stats });
    }

    let result = merge(&outcome.slots);
    info!(
        parent: &span,
        ai_calls = stats.ai_calls,
        failed = stats.failed_batches,
        abandoned = stats.abandoned_batches,
        timed_out = stats.timed_out,
        duration_ms = stats.duration_ms,
        missing_documents = result.missing_documents.len(),
        "analysis run finished"
    );

    Ok(AnalysisOutcome { result, stats })
}
