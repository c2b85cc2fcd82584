//! Error taxonomy for the analysis engine.
//!
//! Configuration errors ([`AnalysisError::InvalidConstraints`],
//! [`AnalysisError::InvalidConcurrency`]) are raised synchronously before any
//! batch is dispatched. Per-batch failures are absorbed by the scheduler and
//! only surface through [`AnalysisStats::failed_batches`]; the
//! [`AnalysisError::PerBatchInference`] variant exists so those failures can
//! be recorded and logged with a uniform shape. A run where every batch
//! failed ends in [`AnalysisError::TotalInferenceFailure`], which still
//! carries the run's statistics. A missed deadline is not an error at all:
//! it is reported through [`AnalysisStats::timed_out`] on a successful
//! outcome.

use thiserror::Error;

use crate::models::AnalysisStats;

/// Errors produced by batching, planning, and orchestration.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid batch constraints: {0}")]
    InvalidConstraints(String),

    #[error("invalid concurrency limit: must be greater than zero")]
    InvalidConcurrency,

    #[error("inference failed for batch {batch_index}: {message}")]
    PerBatchInference { batch_index: usize, message: String },

    #[error("inference failed for all {} batches", .stats.total_batches)]
    TotalInferenceFailure {
        /// One entry per failed batch, in batch order.
        failures: Vec<AnalysisError>,
        stats: AnalysisStats,
    },
}

impl AnalysisError {
    pub fn invalid_constraints(msg: impl Into<String>) -> Self {
        Self::InvalidConstraints(msg.into())
    }

    /// `true` for errors caused by caller-supplied limits.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidConstraints(_) | AnalysisError::InvalidConcurrency
        )
    }

    /// HTTP-style status class a caller should map this error to.
    pub fn status_hint(&self) -> u16 {
        match self {
            AnalysisError::InvalidConstraints(_) | AnalysisError::InvalidConcurrency => 400,
            AnalysisError::TotalInferenceFailure { .. } => 503,
            AnalysisError::PerBatchInference { .. } => 500,
        }
    }

    /// Statistics attached to the error, if the run got far enough to
    /// produce them.
    pub fn stats(&self) -> Option<&AnalysisStats> {
        match self {
            AnalysisError::TotalInferenceFailure { stats, .. } => Some(stats),
            _ => None,
        }
    }
}
