//! The report returned to `pdr analyze` callers and stored in the cache.

use chrono::{DateTime, Utc};
use pdr_analysis_core::models::{AnalysisOutcome, AnalysisResult, AnalysisSpecification, AnalysisStats, AnalysisType};
use serde::{Deserialize, Serialize};

use crate::related::RelatedSuggestions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub document_id: i64,
    pub analysis_type: AnalysisType,
    pub summary: ReportSummary,
    pub analysis: AnalysisResult,
    pub stats: AnalysisStats,
    pub metadata: ReportMetadata,
    /// Web search suggestions; present only when related documents were
    /// requested and searched for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<RelatedSuggestions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_missing_documents: usize,
    pub high_priority_items: usize,
    pub total_recommendations: usize,
    #[serde(default)]
    pub total_suggested_related: usize,
    pub analysis_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Number of chunks submitted (one chunk per page in the usual
    /// extraction).
    pub pages_analyzed: usize,
    pub existing_documents_checked: usize,
}

impl AnalysisReport {
    pub fn build(
        specification: &AnalysisSpecification,
        outcome: AnalysisOutcome,
        analysed_at: DateTime<Utc>,
    ) -> Self {
        let AnalysisOutcome { result, stats } = outcome;
        Self {
            document_id: specification.document_id,
            analysis_type: specification.analysis_type,
            summary: ReportSummary {
                total_missing_documents: result.missing_documents.len(),
                high_priority_items: result.high_priority_count(),
                total_recommendations: result.recommendations.len(),
                total_suggested_related: 0,
                analysis_timestamp: analysed_at,
            },
            metadata: ReportMetadata {
                pages_analyzed: stats.total_chunks,
                existing_documents_checked: specification.existing_documents.len(),
            },
            analysis: result,
            stats,
            related: None,
        }
    }

    /// Attach related-document suggestions and count them in the summary.
    pub fn with_related(mut self, related: RelatedSuggestions) -> Self {
        self.summary.total_suggested_related = related.related_documents.len();
        self.related = Some(related);
        self
    }

    /// Multi-line plain-text rendering for the CLI.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "document {} ({} analysis) at {}\n",
            self.document_id,
            self.analysis_type,
            self.summary.analysis_timestamp.format("%Y-%m-%dT%H:%M:%SZ")
        ));
        out.push_str(&format!(
            "  missing documents: {} ({} high priority)\n",
            self.summary.total_missing_documents, self.summary.high_priority_items
        ));
        for doc in &self.analysis.missing_documents {
            out.push_str(&format!(
                "    [{:?}] {} ({}) p.{}: {}\n",
                doc.priority, doc.document_name, doc.document_type, doc.page, doc.reason
            ));
        }
        out.push_str(&format!(
            "  recommendations: {}\n",
            self.summary.total_recommendations
        ));
        for rec in &self.analysis.recommendations {
            out.push_str(&format!("    - {}\n", rec));
        }
        if let Some(related) = &self.related {
            out.push_str(&format!(
                "  related documents: {}\n",
                self.summary.total_suggested_related
            ));
            for hit in &related.related_documents {
                out.push_str(&format!("    - {} <{}>\n", hit.title, hit.url));
            }
            for entry in related.suggested_links.iter().filter(|e| !e.links.is_empty()) {
                out.push_str(&format!("    {}:\n", entry.document_name));
                for hit in &entry.links {
                    out.push_str(&format!("      - {} <{}>\n", hit.title, hit.url));
                }
            }
        }
        out.push_str(&format!(
            "  stats: chunks={} batches={} ai_calls={} failed={} abandoned={} timed_out={} duration={}ms\n",
            self.stats.total_chunks,
            self.stats.total_batches,
            self.stats.ai_calls,
            self.stats.failed_batches,
            self.stats.abandoned_batches,
            self.stats.timed_out,
            self.stats.duration_ms
        ));
        out
    }
}
