//! Related-document suggestions from web search.
//!
//! When a request sets `include_related_docs` and the merged result lists
//! missing documents, the service runs two kinds of query after the merge:
//!
//! - one query for documents that usually accompany this kind of document,
//!   kept as [`RelatedSuggestions::related_documents`];
//! - one query per high-priority missing document, looking for templates
//!   and examples on `.gov`, `.edu` and `.org` sites.
//!
//! Search failures never fail the analysis. A failed query contributes no
//! results and is logged.
//!
//! # Providers
//!
//! - **[`DuckDuckGoSearch`]** queries the DuckDuckGo Instant Answer API.
//! - **[`DisabledSearch`]** is the default and turns the enrichment off.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use pdr_analysis_core::models::{AnalysisResult, AnalysisSpecification, Priority};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RelatedSearchConfig;

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Search hits for one missing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedLinks {
    pub document_name: String,
    pub links: Vec<SearchResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedSuggestions {
    pub related_documents: Vec<SearchResult>,
    pub suggested_links: Vec<SuggestedLinks>,
}

/// A web search backend.
#[async_trait]
pub trait RelatedDocumentSearch: Send + Sync {
    fn name(&self) -> &str;

    /// `false` turns the enrichment off without a query.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Build the search backend selected by `config.provider`.
pub fn create_search(config: &RelatedSearchConfig) -> Result<Arc<dyn RelatedDocumentSearch>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSearch)),
        "duckduckgo" => Ok(Arc::new(DuckDuckGoSearch::new(config)?)),
        other => bail!("Unknown related_search provider: {}", other),
    }
}

/// Run the related-document queries for a merged result.
///
/// `related_results` and `link_results` cap the hits kept per query.
pub async fn suggest_related(
    search: &dyn RelatedDocumentSearch,
    specification: &AnalysisSpecification,
    result: &AnalysisResult,
    config: &RelatedSearchConfig,
) -> RelatedSuggestions {
    let related_query = format!(
        "standard related documents for {} {} titled {}",
        specification.analysis_type, specification.category, specification.title
    );
    let related_documents = search_or_empty(search, &related_query, config.related_results).await;

    let mut suggested_links = Vec::new();
    for missing in result
        .missing_documents
        .iter()
        .filter(|d| d.priority == Priority::High)
    {
        let query = format!(
            "{} {} template example site:gov OR site:edu OR site:org",
            missing.document_name, missing.document_type
        );
        let links = search_or_empty(search, &query, config.link_results).await;
        suggested_links.push(SuggestedLinks {
            document_name: missing.document_name.clone(),
            links,
        });
    }

    debug!(
        provider = search.name(),
        related = related_documents.len(),
        high_priority = suggested_links.len(),
        "added related-document suggestions"
    );
    RelatedSuggestions {
        related_documents,
        suggested_links,
    }
}

async fn search_or_empty(
    search: &dyn RelatedDocumentSearch,
    query: &str,
    max_results: usize,
) -> Vec<SearchResult> {
    match search.search(query, max_results).await {
        Ok(mut results) => {
            results.truncate(max_results);
            results
        }
        Err(e) => {
            warn!(provider = search.name(), query, error = %e, "related document search failed");
            Vec::new()
        }
    }
}

// ============ Disabled ============

pub struct DisabledSearch;

#[async_trait]
impl RelatedDocumentSearch for DisabledSearch {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }
}

// ============ DuckDuckGo ============

/// Client for `GET {base_url}/?q=...&format=json`.
pub struct DuckDuckGoSearch {
    endpoint: String,
    http: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new(config: &RelatedSearchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            endpoint: format!("{}/", config.base_url.trim_end_matches('/')),
            http,
        })
    }
}

#[async_trait]
impl RelatedDocumentSearch for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .context("search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("search API error {}: {}", status, body);
        }

        let json: serde_json::Value = response.json().await?;
        Ok(parse_instant_answer(&json, max_results))
    }
}

/// Flatten `RelatedTopics` (including grouped `Topics`) into results.
fn parse_instant_answer(json: &serde_json::Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();
    let mut pending: Vec<&serde_json::Value> = json["RelatedTopics"]
        .as_array()
        .map(|topics| topics.iter().rev().collect())
        .unwrap_or_default();

    while let Some(topic) = pending.pop() {
        if results.len() >= max_results {
            break;
        }
        if let Some(group) = topic["Topics"].as_array() {
            pending.extend(group.iter().rev());
            continue;
        }
        let (Some(url), Some(text)) = (topic["FirstURL"].as_str(), topic["Text"].as_str()) else {
            continue;
        };
        let title = text.split(" - ").next().unwrap_or(text).trim().to_string();
        results.push(SearchResult {
            title,
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
    results
}
