//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file, via
//! [`Config::default`]) is a valid configuration. [`load_config`] parses and
//! validates; invalid values are rejected with a message naming the key.

use anyhow::{bail, Context, Result};
use pdr_analysis_core::batch::BatchConstraints;
use pdr_analysis_core::plan::{BudgetPolicy, CallBudget};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lower bound for a request's analysis deadline.
pub const MIN_TIMEOUT_MS: u64 = 5_000;
/// Upper bound for a request's analysis deadline.
pub const MAX_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub related_search: RelatedSearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchingConfig {
    #[serde(default = "default_max_chunks_per_call")]
    pub max_chunks_per_call: usize,
    #[serde(default = "default_max_characters_per_call")]
    pub max_characters_per_call: usize,
    #[serde(default = "default_max_ai_calls")]
    pub max_ai_calls: usize,
    #[serde(default)]
    pub budget_policy: BudgetPolicy,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_chunks_per_call: default_max_chunks_per_call(),
            max_characters_per_call: default_max_characters_per_call(),
            max_ai_calls: default_max_ai_calls(),
            budget_policy: BudgetPolicy::default(),
        }
    }
}

impl BatchingConfig {
    pub fn constraints(&self) -> BatchConstraints {
        BatchConstraints::new(self.max_chunks_per_call, self.max_characters_per_call)
    }

    pub fn budget(&self) -> CallBudget {
        CallBudget::new(self.max_ai_calls, self.budget_policy)
    }
}

fn default_max_chunks_per_call() -> usize {
    8
}
fn default_max_characters_per_call() -> usize {
    12_000
}
fn default_max_ai_calls() -> usize {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_concurrency_limit() -> usize {
    4
}
fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl InferenceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4.1".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Keep the cache in a file between `pdr analyze` runs.
    #[serde(default = "default_cache_persist")]
    pub persist: bool,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_hours: default_ttl_hours(),
            max_entries: default_max_entries(),
            persist: default_cache_persist(),
            path: default_cache_path(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_ttl_hours() -> u64 {
    24
}
fn default_max_entries() -> usize {
    1000
}
fn default_cache_persist() -> bool {
    true
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("./.pdr/cache.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelatedSearchConfig {
    /// `disabled` or `duckduckgo`.
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    /// Results kept for the related-documents query.
    #[serde(default = "default_related_results")]
    pub related_results: usize,
    /// Results kept per high-priority missing document.
    #[serde(default = "default_link_results")]
    pub link_results: usize,
}

impl Default for RelatedSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            base_url: default_search_base_url(),
            timeout_secs: default_search_timeout_secs(),
            related_results: default_related_results(),
            link_results: default_link_results(),
        }
    }
}

impl RelatedSearchConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_search_provider() -> String {
    "disabled".to_string()
}
fn default_search_base_url() -> String {
    "https://api.duckduckgo.com".to_string()
}
fn default_search_timeout_secs() -> u64 {
    10
}
fn default_related_results() -> usize {
    5
}
fn default_link_results() -> usize {
    3
}

/// Read, parse, and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate TOML config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate batching
    if config.batching.max_chunks_per_call == 0 {
        bail!("batching.max_chunks_per_call must be > 0");
    }
    if config.batching.max_characters_per_call == 0 {
        bail!("batching.max_characters_per_call must be > 0");
    }
    if config.batching.max_ai_calls == 0 {
        bail!("batching.max_ai_calls must be > 0");
    }

    // Validate scheduler
    if config.scheduler.concurrency_limit == 0 {
        bail!("scheduler.concurrency_limit must be > 0");
    }
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&config.scheduler.timeout_ms) {
        bail!(
            "scheduler.timeout_ms must be between {} and {}",
            MIN_TIMEOUT_MS,
            MAX_TIMEOUT_MS
        );
    }

    // Validate inference
    match config.inference.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown inference provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.inference.is_enabled() && config.inference.model.trim().is_empty() {
        bail!(
            "inference.model must be specified when provider is '{}'",
            config.inference.provider
        );
    }
    if !(0.0..=2.0).contains(&config.inference.temperature) {
        bail!("inference.temperature must be in [0.0, 2.0]");
    }

    // Validate cache
    if config.cache.enabled {
        if config.cache.ttl_hours == 0 {
            bail!("cache.ttl_hours must be > 0 when the cache is enabled");
        }
        if config.cache.max_entries == 0 {
            bail!("cache.max_entries must be > 0 when the cache is enabled");
        }
        if config.cache.persist && config.cache.path.as_os_str().is_empty() {
            bail!("cache.path must be set when cache.persist is true");
        }
    }

    // Validate related search
    match config.related_search.provider.as_str() {
        "disabled" | "duckduckgo" => {}
        other => bail!(
            "Unknown related_search provider: '{}'. Must be disabled or duckduckgo.",
            other
        ),
    }
    if config.related_search.is_enabled() && config.related_search.timeout_secs == 0 {
        bail!("related_search.timeout_secs must be > 0");
    }

    Ok(())
}
