//! Per-batch settlement records produced by the scheduler.
//!
//! Each batch owns exactly one [`BatchSlot`], addressed by its batch index.
//! A slot starts [`BatchSlot::Pending`] and is overwritten once, when the
//! batch's invocation settles or is abandoned at the deadline.

use crate::models::PartialResult;

/// Final state of one batch's inference invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSlot {
    /// Never dispatched (the deadline expired while it was queued).
    Pending,
    /// Dispatched and returned a partial result.
    Succeeded(PartialResult),
    /// Dispatched and returned an error.
    Failed(String),
    /// Dispatched but still in flight when the deadline expired.
    Abandoned,
}

impl BatchSlot {
    pub fn is_dispatched(&self) -> bool {
        !matches!(self, BatchSlot::Pending)
    }

    pub fn partial(&self) -> Option<&PartialResult> {
        match self {
            BatchSlot::Succeeded(partial) => Some(partial),
            _ => None,
        }
    }
}

/// Everything the scheduler observed for one run, in batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub slots: Vec<BatchSlot>,
    pub timed_out: bool,
}

impl ScheduleOutcome {
    pub fn dispatched(&self) -> usize {
        self.slots.iter().filter(|s| s.is_dispatched()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, BatchSlot::Succeeded(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, BatchSlot::Failed(_)))
            .count()
    }

    pub fn abandoned(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, BatchSlot::Abandoned))
            .count()
    }

    /// `true` when there was work, nothing timed out, and every batch
    /// failed.
    pub fn all_failed(&self) -> bool {
        !self.timed_out && !self.slots.is_empty() && self.failed() == self.slots.len()
    }
}
