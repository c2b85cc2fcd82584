//! Prometheus metrics for predictive analysis requests.
//!
//! Each [`AnalysisMetrics`] owns its own [`Registry`], so two services in
//! one process (or two tests) never share series.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `pdr_predictive_analysis_duration_seconds` | histogram | `result`, `cached` |
//! | `pdr_predictive_analysis_requests_total` | counter | `result`, `cached` |
//! | `pdr_predictive_analysis_cache_hits_total` | counter | none |
//! | `pdr_predictive_analysis_ai_calls` | histogram | none |

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "pdr_predictive_analysis";
const REQUEST_LABELS: &[&str] = &["result", "cached"];

pub const DURATION_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0];
pub const AI_CALL_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 20.0, 40.0, 80.0, 120.0, 200.0];

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestResult {
    Success,
    /// Succeeded with partial results because the deadline expired.
    Timeout,
    Error,
}

impl RequestResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestResult::Success => "success",
            RequestResult::Timeout => "timeout",
            RequestResult::Error => "error",
        }
    }
}

/// One label set for the request-level series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Labels {
    pub result: RequestResult,
    pub cached: bool,
}

impl Labels {
    pub fn new(result: RequestResult, cached: bool) -> Self {
        Self { result, cached }
    }

    /// Values in `REQUEST_LABELS` order.
    fn values(&self) -> [&'static str; 2] {
        [self.result.as_str(), if self.cached { "true" } else { "false" }]
    }
}

/// All analysis metrics, registered on a private registry.
pub struct AnalysisMetrics {
    registry: Registry,
    duration_seconds: HistogramVec,
    requests_total: IntCounterVec,
    cache_hits_total: IntCounter,
    ai_calls: Histogram,
}

impl AnalysisMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "duration_seconds",
                "Time spent serving predictive analysis requests",
            )
            .namespace(NAMESPACE)
            .buckets(DURATION_BUCKETS.to_vec()),
            REQUEST_LABELS,
        )?;
        let requests_total = IntCounterVec::new(
            Opts::new(
                "requests_total",
                "Total predictive analysis requests grouped by outcome",
            )
            .namespace(NAMESPACE),
            REQUEST_LABELS,
        )?;
        let cache_hits_total = IntCounter::with_opts(
            Opts::new("cache_hits_total", "Count of predictive analysis cache hits")
                .namespace(NAMESPACE),
        )?;
        let ai_calls = Histogram::with_opts(
            HistogramOpts::new("ai_calls", "Distribution of inference calls per analysis run")
                .namespace(NAMESPACE)
                .buckets(AI_CALL_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(duration_seconds.clone()))?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(ai_calls.clone()))?;

        Ok(Self {
            registry,
            duration_seconds,
            requests_total,
            cache_hits_total,
            ai_calls,
        })
    }

    /// Record one finished request.
    pub fn record_request(&self, labels: Labels, elapsed_secs: f64) {
        let values = labels.values();
        self.requests_total.with_label_values(&values).inc();
        self.duration_seconds
            .with_label_values(&values)
            .observe(elapsed_secs);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits_total.inc();
    }

    pub fn record_ai_calls(&self, calls: usize) {
        self.ai_calls.observe(calls as f64);
    }

    /// Requests recorded under `labels`.
    pub fn requests(&self, labels: Labels) -> u64 {
        self.requests_total.with_label_values(&labels.values()).get()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits_total.get()
    }

    /// Number of runs observed by the `ai_calls` histogram.
    pub fn runs_observed(&self) -> u64 {
        self.ai_calls.get_sample_count()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered series.
    pub fn render_text(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_else(|e| format!("# Error encoding metrics: {}\n", e))
    }
}
