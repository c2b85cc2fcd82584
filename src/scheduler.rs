//! Bounded-concurrency batch scheduler.
//!
//! Runs one inference invocation per [`Batch`] on a worker pool owned by a
//! single call to [`run`]. Nothing here is process-wide: two concurrent
//! analyses get two independent pools.
//!
//! # Execution model
//!
//! ```text
//!  batches (in order) ──▶ dispatch loop ──▶ JoinSet of tasks ──▶ slots[index]
//!                            │  ▲                 │
//!                  acquire permit  └── join_next ◀┘
//!                  (Semaphore, size = concurrency_limit)
//! ```
//!
//! - A task holds a semaphore permit for the whole invocation, so no more
//!   than `concurrency_limit` invocations are ever in flight.
//! - Batches are dispatched strictly in batch order; a new batch goes out
//!   as soon as a running one settles.
//! - Every task returns `(index, slot)` and the join loop stores it at
//!   `slots[index]`, so completion order never leaks into result order.
//! - A failed invocation marks its own slot and nothing else. There are no
//!   retries at this layer.
//! - When the deadline passes, tasks still running are aborted and their
//!   slots stay [`BatchSlot::Abandoned`]; batches never dispatched stay
//!   [`BatchSlot::Pending`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pdr_analysis_core::batch::Batch;
use pdr_analysis_core::error::AnalysisError;
use pdr_analysis_core::inference::InferenceClient;
use pdr_analysis_core::models::AnalysisSpecification;
use pdr_analysis_core::outcome::{BatchSlot, ScheduleOutcome};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::progress::{ProgressEvent, ProgressReporter};

/// Knobs for one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// Maximum simultaneously in-flight invocations. Must be > 0.
    pub concurrency_limit: usize,
    /// Overall budget for the run, measured from the start of [`run`].
    pub deadline: Option<Duration>,
}

impl ScheduleOptions {
    pub fn new(concurrency_limit: usize, deadline: Option<Duration>) -> Self {
        Self {
            concurrency_limit,
            deadline,
        }
    }
}

/// Dispatch every batch to `client` and collect one slot per batch.
///
/// # Errors
///
/// [`AnalysisError::InvalidConcurrency`] if `concurrency_limit` is zero;
/// nothing is dispatched in that case. Inference failures are never
/// returned from here: they are recorded in their slot.
pub async fn run(
    batches: Vec<Batch>,
    specification: Arc<AnalysisSpecification>,
    client: Arc<dyn InferenceClient>,
    options: ScheduleOptions,
    progress: &dyn ProgressReporter,
) -> Result<ScheduleOutcome, AnalysisError> {
    if options.concurrency_limit == 0 {
        return Err(AnalysisError::InvalidConcurrency);
    }

    let total = batches.len();
    let document_id = specification.document_id;
    let mut slots = vec![BatchSlot::Pending; total];
    let deadline = options.deadline.map(|d| Instant::now() + d);

    let semaphore = Arc::new(Semaphore::new(options.concurrency_limit));
    let mut tasks: JoinSet<(usize, BatchSlot)> = JoinSet::new();
    let mut task_index: HashMap<Id, usize> = HashMap::new();
    let mut queue = batches.into_iter().enumerate().peekable();
    let mut settled = 0usize;
    let mut failed = 0usize;
    let mut timed_out = false;

    loop {
        while queue.peek().is_some() {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };
            let Some((index, batch)) = queue.next() else {
                break;
            };
            let client = Arc::clone(&client);
            let specification = Arc::clone(&specification);

            debug!(batch = index, chunks = batch.len(), chars = batch.char_count, "dispatching batch");
            // Overwritten when the task settles; left as-is if the deadline wins.
            slots[index] = BatchSlot::Abandoned;

            let handle = tasks.spawn(async move {
                let _permit = permit;
                let slot = match client.invoke(&batch, &specification).await {
                    Ok(partial) => BatchSlot::Succeeded(partial),
                    Err(e) => BatchSlot::Failed(format!("{:#}", e)),
                };
                (index, slot)
            });
            task_index.insert(handle.id(), index);
        }

        if tasks.is_empty() {
            break;
        }

        let joined = match deadline {
            Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            },
            None => tasks.join_next().await,
        };

        let Some(joined) = joined else {
            break;
        };
        let (index, slot) = settle(joined, &task_index);
        if let BatchSlot::Failed(message) = &slot {
            failed += 1;
            let err = AnalysisError::PerBatchInference {
                batch_index: index,
                message: message.clone(),
            };
            warn!(client = client.name(), error = %err, "batch inference failed");
        }
        slots[index] = slot;
        settled += 1;
        progress.report(ProgressEvent::Settled {
            document_id,
            settled,
            failed,
            total,
        });
    }

    if timed_out {
        // Keep anything that finished between the last poll and the deadline.
        while let Some(joined) = tasks.try_join_next() {
            let (index, slot) = settle(joined, &task_index);
            if matches!(slot, BatchSlot::Failed(_)) {
                failed += 1;
            }
            slots[index] = slot;
            settled += 1;
        }
        let in_flight = tasks.len();
        tasks.abort_all();
        warn!(
            settled,
            failed,
            abandoned = in_flight,
            never_dispatched = queue.count(),
            total,
            "analysis deadline expired; continuing with settled batches"
        );
    }

    Ok(ScheduleOutcome { slots, timed_out })
}

/// Turn a joined task into its slot. A panicking task fails its own batch.
fn settle(
    joined: Result<(usize, BatchSlot), JoinError>,
    task_index: &HashMap<Id, usize>,
) -> (usize, BatchSlot) {
    match joined {
        Ok(pair) => pair,
        Err(e) => {
            let index = task_index.get(&e.id()).copied().unwrap_or_default();
            (index, BatchSlot::Failed(format!("inference task aborted: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use pdr_analysis_core::batch::{create_chunk_batches, BatchConstraints};
    use pdr_analysis_core::models::{AnalysisType, Chunk, PartialResult};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Test double: sleeps per batch, fails chosen batches, tracks
    /// concurrency and dispatch order.
    struct ScriptedClient {
        delays_ms: Vec<u64>,
        fail: HashSet<usize>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
        dispatch_order: Mutex<Vec<usize>>,
    }

    impl ScriptedClient {
        fn new(delays_ms: Vec<u64>, fail: &[usize]) -> Self {
            Self {
                delays_ms,
                fail: fail.iter().copied().collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                dispatch_order: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, batch: &Batch, _spec: &AnalysisSpecification) -> Result<PartialResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.dispatch_order.lock().unwrap().push(batch.index);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = self.delays_ms.get(batch.index).copied().unwrap_or(1);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&batch.index) {
                bail!("service unavailable for batch {}", batch.index);
            }
            Ok(PartialResult {
                missing_documents: vec![],
                recommendations: vec![format!("batch-{}", batch.index)],
            })
        }
    }

    fn spec() -> Arc<AnalysisSpecification> {
        Arc::new(AnalysisSpecification {
            analysis_type: AnalysisType::General,
            include_related_docs: false,
            existing_documents: vec![],
            title: "Sample".into(),
            category: "general".into(),
            company_id: 1,
            document_id: 10,
        })
    }

    fn batches(n: usize) -> Vec<Batch> {
        let chunks: Vec<Chunk> = (1..=n as i64).map(|i| Chunk::new(i, i, "text")).collect();
        create_chunk_batches(&chunks, BatchConstraints::new(1, 100)).unwrap()
    }

    struct Recording(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recording {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn recommendation(slot: &BatchSlot) -> Option<&str> {
        slot.partial().map(|p| p.recommendations[0].as_str())
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected_before_dispatch() {
        let client = Arc::new(ScriptedClient::new(vec![], &[]));
        let err = run(
            batches(3),
            spec(),
            client.clone(),
            ScheduleOptions::new(0, None),
            &NoProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConcurrency));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_results_are_index_addressed() {
        // Later batches finish first.
        let client = Arc::new(ScriptedClient::new(vec![60, 40, 20, 1], &[]));
        let outcome = run(batches(4), spec(), client, ScheduleOptions::new(4, None), &NoProgress)
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        let recs: Vec<_> = outcome.slots.iter().map(recommendation).collect();
        assert_eq!(
            recs,
            vec![Some("batch-0"), Some("batch-1"), Some("batch-2"), Some("batch-3")]
        );
    }

    #[tokio::test]
    async fn test_concurrency_limit_respected_and_dispatch_ordered() {
        let client = Arc::new(ScriptedClient::new(vec![15; 12], &[]));
        let outcome = run(
            batches(12),
            spec(),
            client.clone(),
            ScheduleOptions::new(3, None),
            &NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.succeeded(), 12);
        assert_eq!(client.calls.load(Ordering::SeqCst), 12);
        assert!(client.max_in_flight.load(Ordering::SeqCst) <= 3);
        // First wave goes out in batch order before anything settles.
        let order = client.dispatch_order.lock().unwrap().clone();
        let mut first_wave = order[..3].to_vec();
        first_wave.sort();
        assert_eq!(first_wave, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let client = Arc::new(ScriptedClient::new(vec![5; 5], &[2]));
        let outcome = run(batches(5), spec(), client.clone(), ScheduleOptions::new(2, None), &NoProgress)
            .await
            .unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 5);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(outcome.succeeded(), 4);
        assert!(matches!(&outcome.slots[2], BatchSlot::Failed(m) if m.contains("batch 2")));
        assert!(!outcome.all_failed());
    }

    #[tokio::test]
    async fn test_all_failed_is_flagged() {
        let client = Arc::new(ScriptedClient::new(vec![1; 3], &[0, 1, 2]));
        let outcome = run(batches(3), spec(), client, ScheduleOptions::new(8, None), &NoProgress)
            .await
            .unwrap();
        assert!(outcome.all_failed());
    }

    #[tokio::test]
    async fn test_deadline_abandons_in_flight_and_skips_queue() {
        // Batch 0 is fast, batch 1 hangs, batch 2 waits behind it.
        let client = Arc::new(ScriptedClient::new(vec![1, 10_000, 1], &[]));
        let outcome = run(
            batches(3),
            spec(),
            client.clone(),
            ScheduleOptions::new(1, Some(Duration::from_millis(200))),
            &NoProgress,
        )
        .await
        .unwrap();

        assert!(outcome.timed_out);
        assert!(matches!(outcome.slots[0], BatchSlot::Succeeded(_)));
        assert_eq!(outcome.slots[1], BatchSlot::Abandoned);
        assert_eq!(outcome.slots[2], BatchSlot::Pending);
        assert_eq!(outcome.dispatched(), 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_batches() {
        let client = Arc::new(ScriptedClient::new(vec![], &[]));
        let outcome = run(vec![], spec(), client, ScheduleOptions::new(2, None), &NoProgress)
            .await
            .unwrap();
        assert!(outcome.slots.is_empty());
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_settled_events_count_each_join() {
        let client = Arc::new(ScriptedClient::new(vec![1; 3], &[1]));
        let progress = Recording(Mutex::new(Vec::new()));
        run(batches(3), spec(), client, ScheduleOptions::new(1, None), &progress)
            .await
            .unwrap();

        let settled = |settled, failed| ProgressEvent::Settled {
            document_id: 10,
            settled,
            failed,
            total: 3,
        };
        let events = progress.0.into_inner().unwrap();
        assert_eq!(events, vec![settled(1, 0), settled(2, 1), settled(3, 1)]);
    }
}
