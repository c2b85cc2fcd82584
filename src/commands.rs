//! `pdr` subcommand implementations.
//!
//! Each `run_*` function prints its own output to stdout. The structured
//! pieces ([`load_chunks`], [`plan_summary`]) are separate so they can be
//! tested without capturing output.

use std::path::Path;

use anyhow::{bail, Context, Result};
use pdr_analysis_core::batch::{create_chunk_batches, BatchConstraints};
use pdr_analysis_core::error::AnalysisError;
use pdr_analysis_core::models::{AnalysisSpecification, Chunk};
use pdr_analysis_core::plan::{plan, CallBudget};
use serde::Serialize;
use tracing::warn;

use crate::cache::AnalysisCache;
use crate::config::Config;
use crate::openai::create_client;
use crate::progress::ProgressMode;
use crate::related::create_search;
use crate::service::{AnalysisRequest, AnalysisService};

/// Read a JSON array of `{ "id", "page", "content" }` objects.
pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chunks file: {}", path.display()))?;
    let chunks: Vec<Chunk> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse chunks file: {}", path.display()))?;
    Ok(chunks)
}

/// Dry-run view of how a document would be batched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub total_chunks: usize,
    pub total_characters: usize,
    pub configured: BatchConstraints,
    pub effective: BatchConstraints,
    pub budget: CallBudget,
    pub batch_sizes: Vec<usize>,
}

pub fn plan_summary(chunks: &[Chunk], config: &Config) -> Result<PlanSummary, AnalysisError> {
    let configured = config.batching.constraints();
    let budget = config.batching.budget();
    let effective = plan(chunks, configured, budget)?;
    let batches = create_chunk_batches(chunks, effective)?;

    Ok(PlanSummary {
        total_chunks: chunks.len(),
        total_characters: chunks.iter().map(Chunk::char_len).sum(),
        configured,
        effective,
        budget,
        batch_sizes: batches.iter().map(|b| b.len()).collect(),
    })
}

pub fn run_plan(config: &Config, chunks_path: &Path, json: bool) -> Result<()> {
    let chunks = load_chunks(chunks_path)?;
    let summary = plan_summary(&chunks, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{} chunks, {} characters",
        summary.total_chunks, summary.total_characters
    );
    println!(
        "configured: {} chunks / {} chars per call, budget {} calls ({:?})",
        summary.configured.max_chunks_per_call,
        summary.configured.max_characters_per_call,
        summary.budget.max_ai_calls,
        summary.budget.policy
    );
    println!(
        "effective:  {} chunks / {} chars per call",
        summary.effective.max_chunks_per_call, summary.effective.max_characters_per_call
    );
    println!("{} batches: {:?}", summary.batch_sizes.len(), summary.batch_sizes);
    if summary.batch_sizes.len() > summary.budget.max_ai_calls {
        println!("warning: plan exceeds the call budget");
    }
    Ok(())
}

/// Flags for `pdr analyze`, already parsed.
pub struct AnalyzeArgs {
    pub specification: AnalysisSpecification,
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub force_refresh: bool,
    pub json: bool,
    pub metrics: bool,
    pub progress: ProgressMode,
}

pub async fn run_analyze(config: &Config, chunks_path: &Path, args: AnalyzeArgs) -> Result<()> {
    let chunks = load_chunks(chunks_path)?;
    if !config.inference.is_enabled() {
        bail!("inference.provider is 'disabled'; use `pdr plan` for a dry run");
    }
    let client = create_client(&config.inference)?;
    let search = create_search(&config.related_search)?;
    let mut service = AnalysisService::new(config.clone(), client)?
        .with_search(search)
        .with_progress(args.progress.reporter());

    let cache_file = (config.cache.enabled && config.cache.persist).then_some(&config.cache.path);
    if let Some(path) = cache_file {
        service = service.with_cache(AnalysisCache::load(path, &config.cache)?);
    }

    let request = AnalysisRequest {
        chunks,
        specification: args.specification,
        timeout_ms: args.timeout_ms,
        concurrency: args.concurrency,
        force_refresh: args.force_refresh,
    };
    let outcome = service.analyze(request).await;

    if let (Some(path), Some(cache)) = (cache_file, service.cache()) {
        if let Err(e) = cache.save(path) {
            warn!(path = %path.display(), error = %e, "failed to save analysis cache");
        }
    }

    if args.metrics {
        // Emitted even when the run failed so the error counters are visible.
        eprint!("{}", service.metrics().render_text());
    }
    let response = outcome?;

    if args.json {
        let body = serde_json::json!({
            "success": true,
            "fromCache": response.from_cache,
            "report": response.report,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print!("{}", response.report.render_text());
        if response.from_cache {
            println!("  (served from cache)");
        }
    }
    Ok(())
}

pub fn run_config_check(config: &Config, path: &Path) {
    println!("config: {} (valid)", path.display());
    println!(
        "batching:  max_chunks_per_call={} max_characters_per_call={} max_ai_calls={} budget_policy={:?}",
        config.batching.max_chunks_per_call,
        config.batching.max_characters_per_call,
        config.batching.max_ai_calls,
        config.batching.budget_policy
    );
    println!(
        "scheduler: concurrency_limit={} timeout_ms={}",
        config.scheduler.concurrency_limit, config.scheduler.timeout_ms
    );
    println!(
        "inference: provider={} model={} temperature={} base_url={} max_retries={}",
        config.inference.provider,
        config.inference.model,
        config.inference.temperature,
        config.inference.base_url,
        config.inference.max_retries
    );
    println!(
        "cache:     enabled={} ttl_hours={} max_entries={} persist={} path={}",
        config.cache.enabled,
        config.cache.ttl_hours,
        config.cache.max_entries,
        config.cache.persist,
        config.cache.path.display()
    );
    println!(
        "related:   provider={} base_url={} timeout_secs={}",
        config.related_search.provider,
        config.related_search.base_url,
        config.related_search.timeout_secs
    );
}
