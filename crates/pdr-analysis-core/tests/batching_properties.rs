//! Property-style checks of the batcher and planner over a spread of
//! deterministic pseudo-random inputs.

use pdr_analysis_core::batch::{create_chunk_batches, BatchConstraints};
use pdr_analysis_core::models::Chunk;
use pdr_analysis_core::plan::{plan, BudgetPolicy, CallBudget};

/// Small linear congruential generator so the inputs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn range(&mut self, lo: usize, hi: usize) -> usize {
        lo + (self.next() as usize) % (hi - lo + 1)
    }
}

fn random_chunks(rng: &mut Lcg, n: usize, max_len: usize) -> Vec<Chunk> {
    (0..n)
        .map(|i| {
            let len = rng.range(0, max_len);
            Chunk::new(i as i64 + 1, (i / 4) as i64 + 1, "w".repeat(len))
        })
        .collect()
}

#[test]
fn batches_partition_input_and_respect_limits() {
    let mut rng = Lcg(0x5eed);

    for _ in 0..200 {
        let n = rng.range(0, 60);
        let chunks = random_chunks(&mut rng, n, 400);
        let constraints = BatchConstraints::new(rng.range(1, 8), rng.range(1, 900));
        let batches = create_chunk_batches(&chunks, constraints).unwrap();

        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, chunks.len());

        let flattened: Vec<&Chunk> = batches.iter().flat_map(|b| b.chunks.iter()).collect();
        assert!(flattened.iter().zip(chunks.iter()).all(|(a, b)| *a == b));

        for batch in &batches {
            assert!(!batch.is_empty());
            assert!(batch.len() <= constraints.max_chunks_per_call);
            if batch.len() > 1 {
                let chars: usize = batch.chunks.iter().map(Chunk::char_len).sum();
                assert!(chars <= constraints.max_characters_per_call);
            }
        }

        for chunk in chunks
            .iter()
            .filter(|c| c.char_len() > constraints.max_characters_per_call)
        {
            let holder = batches
                .iter()
                .find(|b| b.chunks.iter().any(|c| c.id == chunk.id))
                .expect("oversized chunk must not be dropped");
            assert_eq!(holder.len(), 1);
        }

        assert_eq!(batches, create_chunk_batches(&chunks, constraints).unwrap());
    }
}

#[test]
fn call_ceiling_policy_always_fits_budget() {
    let mut rng = Lcg(42);

    for _ in 0..100 {
        let n = rng.range(1, 400);
        let chunks = random_chunks(&mut rng, n, 2000);
        let configured = BatchConstraints::new(rng.range(1, 10), rng.range(100, 5000));
        let budget = CallBudget::new(rng.range(1, 20), BudgetPolicy::CallCeiling);

        let effective = plan(&chunks, configured, budget).unwrap();
        assert!(effective.max_chunks_per_call >= configured.max_chunks_per_call);
        assert!(effective.max_characters_per_call >= configured.max_characters_per_call);

        let batches = create_chunk_batches(&chunks, effective).unwrap();
        assert!(
            batches.len() <= budget.max_ai_calls,
            "{} batches for budget {}",
            batches.len(),
            budget.max_ai_calls
        );
    }
}
