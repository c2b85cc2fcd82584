//! Call budget planning.
//!
//! Fine-grained batching of a very large document can require hundreds of
//! inference calls. The planner widens the configured [`BatchConstraints`]
//! just enough that the batcher stays within a [`CallBudget`].
//!
//! # Algorithm
//!
//! 1. `max_chunks_per_call` becomes the smallest value, no lower than the
//!    configured one, with `ceil(total_chunks / value) <= max_ai_calls`.
//! 2. Under [`BudgetPolicy::CallCeiling`] the character limit is then
//!    doubled until the batcher's batch count fits the budget. Once the
//!    limit reaches the input's total character count only the chunk count
//!    can split batches, so step 1 guarantees the loop ends.
//! 3. Under [`BudgetPolicy::CharacterCeiling`] the character limit is left
//!    alone and the budget may be exceeded.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::batch::{count_batches, BatchConstraints};
use crate::error::AnalysisError;
use crate::models::Chunk;

/// Which ceiling wins when both cannot hold at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// Relax the character limit rather than exceed the call budget.
    #[default]
    CallCeiling,
    /// Never relax the character limit; the call budget is best-effort.
    CharacterCeiling,
}

/// Upper bound on inference calls for one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallBudget {
    pub max_ai_calls: usize,
    pub policy: BudgetPolicy,
}

impl CallBudget {
    pub fn new(max_ai_calls: usize, policy: BudgetPolicy) -> Self {
        Self {
            max_ai_calls,
            policy,
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.max_ai_calls == 0 {
            return Err(AnalysisError::invalid_constraints(
                "max_ai_calls must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for CallBudget {
    fn default() -> Self {
        Self {
            max_ai_calls: 12,
            policy: BudgetPolicy::CallCeiling,
        }
    }
}

/// Compute the effective constraints for `chunks` under `budget`.
///
/// Never lowers either configured limit. Empty input returns the
/// configured constraints unchanged.
///
/// # Errors
///
/// [`AnalysisError::InvalidConstraints`] if a limit or the budget is zero.
pub fn plan(
    chunks: &[Chunk],
    constraints: BatchConstraints,
    budget: CallBudget,
) -> Result<BatchConstraints, AnalysisError> {
    constraints.validate()?;
    budget.validate()?;

    let total = chunks.len();
    if total == 0 {
        return Ok(constraints);
    }

    let min_chunks_per_call = total.div_ceil(budget.max_ai_calls);
    let mut effective = constraints;
    effective.max_chunks_per_call = constraints.max_chunks_per_call.max(min_chunks_per_call);

    let mut batches = count_batches(chunks, effective)?;

    match budget.policy {
        BudgetPolicy::CharacterCeiling => {
            if batches > budget.max_ai_calls {
                warn!(
                    batches,
                    max_ai_calls = budget.max_ai_calls,
                    max_characters_per_call = effective.max_characters_per_call,
                    "character ceiling keeps the run above its call budget"
                );
            }
        }
        BudgetPolicy::CallCeiling => {
            let total_chars: usize = chunks.iter().map(Chunk::char_len).sum();
            while batches > budget.max_ai_calls
                && effective.max_characters_per_call < total_chars
            {
                effective.max_characters_per_call = effective
                    .max_characters_per_call
                    .saturating_mul(2)
                    .min(total_chars);
                batches = count_batches(chunks, effective)?;
            }
        }
    }

    if effective != constraints {
        debug!(
            total_chunks = total,
            batches,
            max_chunks_per_call = effective.max_chunks_per_call,
            max_characters_per_call = effective.max_characters_per_call,
            "widened batch constraints to fit call budget"
        );
    }

    Ok(effective)
}
