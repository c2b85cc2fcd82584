//! Request-level analysis service.
//!
//! Wraps the engine with the concerns of a single request: input checks,
//! the result cache, per-request deadline and concurrency overrides,
//! related-document search, report building, and metrics. The
//! `pdr analyze` command is a thin shell around [`AnalysisService::analyze`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::Utc;
use pdr_analysis_core::cache_key::CacheKey;
use pdr_analysis_core::inference::InferenceClient;
use pdr_analysis_core::models::{AnalysisSpecification, Chunk};
use tracing::{info, warn};

use crate::cache::AnalysisCache;
use crate::config::{Config, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};
use crate::engine::{analyze_with_progress, AnalysisOptions};
use crate::metrics::{AnalysisMetrics, Labels, RequestResult};
use crate::progress::{NoProgress, ProgressReporter};
use crate::related::{suggest_related, DisabledSearch, RelatedDocumentSearch};
use crate::report::AnalysisReport;

/// One analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub chunks: Vec<Chunk>,
    pub specification: AnalysisSpecification,
    /// Overrides `scheduler.timeout_ms`.
    pub timeout_ms: Option<u64>,
    /// Overrides `scheduler.concurrency_limit`.
    pub concurrency: Option<usize>,
    /// Skip the cache lookup. A complete fresh result is still stored.
    pub force_refresh: bool,
}

impl AnalysisRequest {
    pub fn new(chunks: Vec<Chunk>, specification: AnalysisSpecification) -> Self {
        Self {
            chunks,
            specification,
            timeout_ms: None,
            concurrency: None,
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub report: AnalysisReport,
    pub from_cache: bool,
}

pub struct AnalysisService {
    config: Config,
    client: Arc<dyn InferenceClient>,
    search: Arc<dyn RelatedDocumentSearch>,
    cache: Option<AnalysisCache>,
    metrics: Arc<AnalysisMetrics>,
    progress: Box<dyn ProgressReporter>,
}

impl AnalysisService {
    /// Service with an in-memory cache (when enabled), no related-document
    /// search, and its own metrics registry.
    pub fn new(config: Config, client: Arc<dyn InferenceClient>) -> Result<Self> {
        let cache = config
            .cache
            .enabled
            .then(|| AnalysisCache::from_config(&config.cache));
        Ok(Self {
            config,
            client,
            search: Arc::new(DisabledSearch),
            cache,
            metrics: Arc::new(AnalysisMetrics::new()?),
            progress: Box::new(NoProgress),
        })
    }

    /// Replace the cache, e.g. with one loaded from disk. Ignored when the
    /// cache is disabled in the config.
    pub fn with_cache(mut self, cache: AnalysisCache) -> Self {
        if self.config.cache.enabled {
            self.cache = Some(cache);
        }
        self
    }

    pub fn with_search(mut self, search: Arc<dyn RelatedDocumentSearch>) -> Self {
        self.search = search;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AnalysisMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<AnalysisMetrics> {
        &self.metrics
    }

    pub fn cache(&self) -> Option<&AnalysisCache> {
        self.cache.as_ref()
    }

    /// Analyse one document, serving from the cache when possible.
    ///
    /// # Errors
    ///
    /// Invalid request fields fail with a message naming the field. Engine
    /// failures are returned as [`AnalysisError`](pdr_analysis_core::error::AnalysisError)
    /// inside the `anyhow::Error`, so callers can downcast for the
    /// status hint.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<ServiceResponse> {
        let started = Instant::now();
        let AnalysisRequest {
            chunks,
            specification,
            timeout_ms,
            concurrency,
            force_refresh,
        } = request;

        if specification.document_id <= 0 {
            bail!("documentId must be a positive integer");
        }
        let timeout_ms = timeout_ms.unwrap_or(self.config.scheduler.timeout_ms);
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
            bail!(
                "timeoutMs must be between {} and {}",
                MIN_TIMEOUT_MS,
                MAX_TIMEOUT_MS
            );
        }
        if chunks.is_empty() {
            bail!("No chunks found for document {}", specification.document_id);
        }

        let mut options = AnalysisOptions::from_config(&self.config)
            .with_deadline(Some(Duration::from_millis(timeout_ms)));
        if let Some(limit) = concurrency {
            options = options.with_concurrency(limit);
        }

        let key = CacheKey::new(&specification, options.constraints, options.budget);

        if !force_refresh {
            if let Some(report) = self.cache.as_ref().and_then(|c| c.get(&key)) {
                info!(document_id = key.document_id, analysis_type = %key.analysis_type, "serving cached analysis");
                self.metrics.record_cache_hit();
                self.metrics.record_request(
                    Labels::new(RequestResult::Success, true),
                    started.elapsed().as_secs_f64(),
                );
                return Ok(ServiceResponse {
                    report,
                    from_cache: true,
                });
            }
        }

        let outcome = analyze_with_progress(
            &chunks,
            specification.clone(),
            &options,
            Arc::clone(&self.client),
            self.progress.as_ref(),
        )
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(stats) = e.stats() {
                    self.metrics.record_ai_calls(stats.ai_calls);
                }
                self.metrics.record_request(
                    Labels::new(RequestResult::Error, false),
                    started.elapsed().as_secs_f64(),
                );
                warn!(document_id = specification.document_id, error = %e, "analysis failed");
                return Err(e.into());
            }
        };

        let timed_out = outcome.stats.timed_out;
        let complete = !timed_out && outcome.stats.failed_batches == 0;
        self.metrics.record_ai_calls(outcome.stats.ai_calls);

        let related = if specification.include_related_docs
            && self.search.is_enabled()
            && !outcome.result.missing_documents.is_empty()
        {
            Some(
                suggest_related(
                    self.search.as_ref(),
                    &specification,
                    &outcome.result,
                    &self.config.related_search,
                )
                .await,
            )
        } else {
            None
        };

        let mut report = AnalysisReport::build(&specification, outcome, Utc::now());
        if let Some(related) = related {
            report = report.with_related(related);
        }

        // Partial reports are served once and never cached.
        if complete {
            if let Some(cache) = &self.cache {
                cache.insert(key, report.clone());
            }
        }

        let result = if timed_out {
            RequestResult::Timeout
        } else {
            RequestResult::Success
        };
        self.metrics
            .record_request(Labels::new(result, false), started.elapsed().as_secs_f64());

        Ok(ServiceResponse {
            report,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use pdr_analysis_core::batch::Batch;
    use pdr_analysis_core::error::AnalysisError;
    use crate::related::SearchResult;
    use pdr_analysis_core::models::{AnalysisType, MissingDocument, PartialResult, Priority};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticSearch {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelatedDocumentSearch for StaticSearch {
        fn name(&self) -> &str {
            "static"
        }

        async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(vec![SearchResult {
                title: "Standard lease exhibits".into(),
                url: "https://example.gov/lease".into(),
                snippet: String::new(),
            }])
        }
    }

    struct CountingClient {
        calls: AtomicUsize,
        fail: bool,
        fail_batch: Option<usize>,
    }

    impl CountingClient {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                fail_batch: None,
            })
        }

        fn failing_batch(index: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                fail_batch: Some(index),
            })
        }
    }

    #[async_trait]
    impl InferenceClient for CountingClient {
        fn name(&self) -> &str {
            "counting"
        }

        async fn invoke(&self, batch: &Batch, _spec: &AnalysisSpecification) -> Result<PartialResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail || self.fail_batch == Some(batch.index) {
                bail!("model overloaded");
            }
            Ok(PartialResult {
                missing_documents: vec![MissingDocument {
                    document_name: format!("Exhibit {}", batch.index),
                    document_type: "exhibit".into(),
                    reason: "referenced in text".into(),
                    page: batch.chunks[0].page,
                    priority: Priority::High,
                }],
                recommendations: vec![],
            })
        }
    }

    fn request(document_id: i64) -> AnalysisRequest {
        let chunks = (1..=20).map(|i| Chunk::new(i, i, "See Exhibit")).collect();
        AnalysisRequest::new(
            chunks,
            AnalysisSpecification {
                analysis_type: AnalysisType::Contract,
                include_related_docs: false,
                existing_documents: vec![],
                title: "Lease".into(),
                category: "contract".into(),
                company_id: 1,
                document_id,
            },
        )
    }

    #[tokio::test]
    async fn test_second_request_served_from_cache() {
        let client = CountingClient::new(false);
        let service = AnalysisService::new(Config::default(), client.clone()).unwrap();

        let first = service.analyze(request(9)).await.unwrap();
        assert!(!first.from_cache);
        let calls = client.calls.load(Ordering::SeqCst);
        assert!(calls > 0);

        let second = service.analyze(request(9)).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.report, first.report);
        assert_eq!(client.calls.load(Ordering::SeqCst), calls);

        let metrics = service.metrics();
        assert_eq!(metrics.cache_hits(), 1);
        assert_eq!(metrics.requests(Labels::new(RequestResult::Success, true)), 1);
        assert_eq!(metrics.requests(Labels::new(RequestResult::Success, false)), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_lookup() {
        let client = CountingClient::new(false);
        let service = AnalysisService::new(Config::default(), client.clone()).unwrap();

        service.analyze(request(9)).await.unwrap();
        let calls = client.calls.load(Ordering::SeqCst);

        let mut refreshed = request(9);
        refreshed.force_refresh = true;
        let response = service.analyze(refreshed).await.unwrap();
        assert!(!response.from_cache);
        assert_eq!(client.calls.load(Ordering::SeqCst), calls * 2);
        assert_eq!(service.cache().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_runs() {
        let mut config = Config::default();
        config.cache.enabled = false;
        let client = CountingClient::new(false);
        let service = AnalysisService::new(config, client.clone()).unwrap();

        assert!(service.cache().is_none());
        service.analyze(request(3)).await.unwrap();
        let response = service.analyze(request(3)).await.unwrap();
        assert!(!response.from_cache);
    }

    #[tokio::test]
    async fn test_report_summary() {
        let service = AnalysisService::new(Config::default(), CountingClient::new(false)).unwrap();
        let response = service.analyze(request(4)).await.unwrap();
        let report = response.report;
        assert_eq!(report.document_id, 4);
        assert_eq!(report.metadata.pages_analyzed, 20);
        assert_eq!(report.summary.total_missing_documents, report.stats.ai_calls);
        assert_eq!(report.summary.high_priority_items, report.stats.ai_calls);
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let client = CountingClient::new(false);
        let service = AnalysisService::new(Config::default(), client.clone()).unwrap();

        let err = service.analyze(request(0)).await.unwrap_err();
        assert!(err.to_string().contains("documentId"));

        let mut too_short = request(1);
        too_short.timeout_ms = Some(100);
        let err = service.analyze(too_short).await.unwrap_err();
        assert!(err.to_string().contains("timeoutMs"));

        let mut empty = request(1);
        empty.chunks.clear();
        assert!(service.analyze(empty).await.is_err());

        let mut zero = request(1);
        zero.concurrency = Some(0);
        let err = service.analyze(zero).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InvalidConcurrency)
        ));

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_total_failure_recorded_and_not_cached() {
        let client = CountingClient::new(true);
        let service = AnalysisService::new(Config::default(), client).unwrap();

        let err = service.analyze(request(5)).await.unwrap_err();
        let analysis_err = err.downcast_ref::<AnalysisError>().unwrap();
        assert_eq!(analysis_err.status_hint(), 503);

        assert_eq!(
            service
                .metrics()
                .requests(Labels::new(RequestResult::Error, false)),
            1
        );
        assert_eq!(service.metrics().runs_observed(), 1);
        assert!(service.cache().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_not_cached() {
        let client = CountingClient::failing_batch(0);
        let service = AnalysisService::new(Config::default(), client.clone()).unwrap();

        let first = service.analyze(request(6)).await.unwrap();
        assert_eq!(first.report.stats.failed_batches, 1);
        assert!(service.cache().unwrap().is_empty());

        let second = service.analyze(request(6)).await.unwrap();
        assert!(!second.from_cache);
        assert_eq!(
            service
                .metrics()
                .requests(Labels::new(RequestResult::Success, false)),
            2
        );
    }

    #[tokio::test]
    async fn test_related_search_runs_only_when_requested() {
        let search = Arc::new(StaticSearch {
            queries: Mutex::new(Vec::new()),
        });
        let service = AnalysisService::new(Config::default(), CountingClient::new(false))
            .unwrap()
            .with_search(search.clone());

        let plain = service.analyze(request(7)).await.unwrap();
        assert!(plain.report.related.is_none());
        assert!(search.queries.lock().unwrap().is_empty());

        let mut with_related = request(8);
        with_related.specification.include_related_docs = true;
        let response = service.analyze(with_related).await.unwrap();
        let related = response.report.related.as_ref().unwrap();
        assert_eq!(response.report.summary.total_suggested_related, 1);
        // One related query plus one per high-priority missing document.
        assert_eq!(
            search.queries.lock().unwrap().len(),
            1 + response.report.summary.high_priority_items
        );
        assert_eq!(related.suggested_links.len(), response.report.summary.high_priority_items);

        let mut again = request(8);
        again.specification.include_related_docs = true;
        let cached = service.analyze(again).await.unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.report.related, response.report.related);
    }

    #[tokio::test]
    async fn test_with_cache_replaces_in_memory_cache() {
        let preloaded = AnalysisCache::from_config(&Config::default().cache);
        let service = AnalysisService::new(Config::default(), CountingClient::new(false))
            .unwrap()
            .with_cache(preloaded);
        service.analyze(request(2)).await.unwrap();
        assert_eq!(service.cache().unwrap().len(), 1);

        let mut disabled = Config::default();
        disabled.cache.enabled = false;
        let service = AnalysisService::new(disabled, CountingClient::new(false))
            .unwrap()
            .with_cache(AnalysisCache::from_config(&Config::default().cache));
        assert!(service.cache().is_none());
    }
}
