//! Inference client trait.
//!
//! The engine never talks to an AI service directly. Callers inject an
//! [`InferenceClient`]; production code uses the OpenAI client in the
//! `pdr-analysis` app crate and tests use deterministic doubles.
//!
//! Retries are the client's business. The engine calls
//! [`invoke`](InferenceClient::invoke) exactly once per batch and treats any
//! error as that batch's failure.

use anyhow::Result;
use async_trait::async_trait;

use crate::batch::Batch;
use crate::models::{AnalysisSpecification, Chunk, PartialResult};

/// A structured-output inference backend.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use pdr_analysis_core::batch::Batch;
/// use pdr_analysis_core::inference::InferenceClient;
/// use pdr_analysis_core::models::{AnalysisSpecification, PartialResult};
///
/// struct EchoClient;
///
/// #[async_trait]
/// impl InferenceClient for EchoClient {
///     fn name(&self) -> &str { "echo" }
///
///     async fn invoke(&self, batch: &Batch, _spec: &AnalysisSpecification) -> Result<PartialResult> {
///         Ok(PartialResult {
///             missing_documents: vec![],
///             recommendations: vec![format!("batch {} had {} chunks", batch.index, batch.len())],
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Short identifier used in logs (e.g. `"openai:gpt-4.1"`).
    fn name(&self) -> &str;

    /// Analyse one batch under `specification`.
    async fn invoke(
        &self,
        batch: &Batch,
        specification: &AnalysisSpecification,
    ) -> Result<PartialResult>;
}

/// Render a batch's chunks as page-headed text, one block per chunk.
///
/// ```rust
/// use pdr_analysis_core::inference::group_content;
/// use pdr_analysis_core::models::Chunk;
///
/// let text = group_content(&[Chunk::new(1, 3, "Alpha"), Chunk::new(2, 4, "Beta")]);
/// assert_eq!(text, "=== Page 3 ===\nAlpha\n\n=== Page 4 ===\nBeta");
/// ```
pub fn group_content(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("=== Page {} ===\n{}", c.page, c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
