//! Core data models for predictive document analysis.
//!
//! These types describe the chunks that enter the engine, the specification
//! forwarded to every inference call, and the merged result and statistics
//! that leave it. Everything here lives for a single orchestration run.
//!
//! Wire names follow the JSON contract shared with the inference service
//! and the (external) HTTP layer, so serde renames fields to camelCase.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One unit of extracted document text, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub page: i64,
    pub content: String,
}

impl Chunk {
    pub fn new(id: i64, page: i64, content: impl Into<String>) -> Self {
        Self {
            id,
            page,
            content: content.into(),
        }
    }

    /// Content length in characters (Unicode scalar values).
    ///
    /// Batching limits are expressed in characters, not bytes, so that
    /// multi-byte text is not penalised relative to ASCII.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// The flavour of analysis requested. Selects the system framing sent to
/// the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Contract,
    Financial,
    Technical,
    Compliance,
    #[default]
    General,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 5] = [
        AnalysisType::Contract,
        AnalysisType::Financial,
        AnalysisType::Technical,
        AnalysisType::Compliance,
        AnalysisType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Contract => "contract",
            AnalysisType::Financial => "financial",
            AnalysisType::Technical => "technical",
            AnalysisType::Compliance => "compliance",
            AnalysisType::General => "general",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        AnalysisType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| {
                format!(
                    "unknown analysis type '{}'. Must be one of: contract, financial, technical, compliance, general",
                    s
                )
            })
    }
}

/// Declarative description of what to look for.
///
/// Opaque to the engine: it is handed unchanged to every inference call
/// alongside the batch being analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSpecification {
    #[serde(rename = "type", default)]
    pub analysis_type: AnalysisType,
    #[serde(default)]
    pub include_related_docs: bool,
    #[serde(default)]
    pub existing_documents: Vec<String>,
    pub title: String,
    pub category: String,
    pub company_id: i64,
    pub document_id: i64,
}

/// Importance of a missing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// A document referenced by the analysed text but not present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingDocument {
    pub document_name: String,
    pub document_type: String,
    pub reason: String,
    pub page: i64,
    pub priority: Priority,
}

/// Structured output of a single batch's inference call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResult {
    #[serde(default)]
    pub missing_documents: Vec<MissingDocument>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Merged answer across all succeeded batches, in batch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub missing_documents: Vec<MissingDocument>,
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    pub fn high_priority_count(&self) -> usize {
        self.missing_documents
            .iter()
            .filter(|d| d.priority == Priority::High)
            .count()
    }
}

/// Execution statistics for one orchestration run.
///
/// Produced exactly once per run that passes configuration checks and
/// never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    /// Input chunk count, independent of batching.
    pub total_chunks: usize,
    /// Batches produced by the planner-adjusted batcher.
    pub total_batches: usize,
    /// Inference invocations actually dispatched, failed ones included.
    pub ai_calls: usize,
    /// Wall time from orchestration start until settlement or deadline.
    pub duration_ms: u64,
    /// Invocations that returned an error.
    pub failed_batches: usize,
    /// Invocations still in flight when the deadline expired.
    #[serde(default)]
    pub abandoned_batches: usize,
    /// Set when the deadline elapsed before every batch settled.
    #[serde(default)]
    pub timed_out: bool,
}

/// What the engine hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub stats: AnalysisStats,
}
