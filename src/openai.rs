//! Inference client implementations.
//!
//! - **[`OpenAiInferenceClient`]** — calls the OpenAI chat completions API
//!   with a strict JSON schema so every reply parses into a
//!   [`PartialResult`].
//! - **[`DisabledInferenceClient`]** — always errors. Used when
//!   `inference.provider = "disabled"`, which keeps `pdr plan` and
//!   `pdr config-check` usable without credentials.
//!
//! # Retry Strategy
//!
//! Transient errors are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (other) → fail immediately
//! - Network errors → retry
//!
//! Backoff delays: 1s, 2s, 4s, 8s, ... (capped at 2^5 = 32s). Retries stay
//! inside one [`InferenceClient::invoke`]; the scheduler sees one call.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use pdr_analysis_core::batch::Batch;
use pdr_analysis_core::inference::{group_content, InferenceClient};
use pdr_analysis_core::models::{AnalysisSpecification, AnalysisType, PartialResult};
use tracing::{debug, warn};

use crate::config::InferenceConfig;

/// Build the client selected by `config.provider`.
pub fn create_client(config: &InferenceConfig) -> Result<Arc<dyn InferenceClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledInferenceClient)),
        "openai" => Ok(Arc::new(OpenAiInferenceClient::new(config)?)),
        other => bail!("Unknown inference provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledInferenceClient;

#[async_trait]
impl InferenceClient for DisabledInferenceClient {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn invoke(&self, _batch: &Batch, _spec: &AnalysisSpecification) -> Result<PartialResult> {
        bail!("Inference provider is disabled")
    }
}

// ============ OpenAI ============

/// Structured-output client for `POST {base_url}/v1/chat/completions`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiInferenceClient {
    name: String,
    model: String,
    temperature: f32,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    http: reqwest::Client,
}

impl OpenAiInferenceClient {
    /// # Errors
    ///
    /// Fails if `OPENAI_API_KEY` is not set or the HTTP client cannot be
    /// built.
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            name: format!("openai:{}", config.model),
            model: config.model.clone(),
            temperature: config.temperature,
            endpoint: format!(
                "{}/v1/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key,
            max_retries: config.max_retries,
            http,
        })
    }
}

#[async_trait]
impl InferenceClient for OpenAiInferenceClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, batch: &Batch, specification: &AnalysisSpecification) -> Result<PartialResult> {
        let body = request_body(&self.model, self.temperature, batch, specification);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(batch = batch.index, attempt, ?delay, "retrying inference call");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(batch = batch.index, %status, "transient OpenAI error");
                        last_err = Some(anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Inference failed after retries")))
    }
}

/// System framing for each analysis type.
pub fn system_prompt(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Contract => "You are an expert at reviewing contracts and finding referenced exhibits, schedules, and addendums that are not attached.",
        AnalysisType::Financial => "You are an expert at reviewing financial documents and finding referenced reports, statements, and supporting records that are not attached.",
        AnalysisType::Technical => "You are an expert at reviewing technical documents and finding referenced specifications, manuals, and deliverables that are not attached.",
        AnalysisType::Compliance => "You are an expert at reviewing compliance documents and finding referenced regulatory filings and policies that are not attached.",
        AnalysisType::General => "You are an expert at reviewing documents and finding referenced material that is not attached.",
    }
}

fn focus(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Contract => "Look for exhibits, schedules, addendums, and supporting agreements.",
        AnalysisType::Financial => "Look for balance sheets, income statements, audit reports, and supporting financial records.",
        AnalysisType::Technical => "Look for specifications, manuals, diagrams, and project deliverables.",
        AnalysisType::Compliance => "Look for regulatory filings, policy documents, certifications, and legal requirements.",
        AnalysisType::General => "Look for any attachment or supporting material the text refers to.",
    }
}

/// User message for one batch: instructions, exclusions, then the
/// page-headed content.
pub fn user_prompt(batch: &Batch, specification: &AnalysisSpecification) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Document: \"{}\" (category: {}).\n",
        specification.title, specification.category
    ));
    prompt.push_str(
        "Find documents that the content below explicitly references but that are not included.\n\
         Only report references that are clear and specific; do not infer documents that are not mentioned.\n\
         For each one give its name, its type, a short reason, the page where it is referenced, \
         and a priority (high if critical, medium if supporting, low if optional).\n\
         Then give two or three recommendations for obtaining the missing items.\n",
    );
    if specification.include_related_docs {
        prompt.push_str("Consider related documents and publicly available templates when recommending.\n");
    }
    prompt.push_str(focus(specification.analysis_type));
    prompt.push('\n');
    if !specification.existing_documents.is_empty() {
        prompt.push_str(&format!(
            "Already available (never report these as missing): {}.\n",
            specification.existing_documents.join(", ")
        ));
    }
    prompt.push_str("\nCONTENT:\n");
    prompt.push_str(&group_content(&batch.chunks));
    prompt
}

/// The chat completions request body with a strict JSON-schema response
/// format.
pub fn request_body(
    model: &str,
    temperature: f32,
    batch: &Batch,
    specification: &AnalysisSpecification,
) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "temperature": temperature,
        "messages": [
            { "role": "system", "content": system_prompt(specification.analysis_type) },
            { "role": "user", "content": user_prompt(batch, specification) },
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": "analysis_result",
                "strict": true,
                "schema": response_schema(),
            }
        }
    })
}

fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["missingDocuments", "recommendations"],
        "properties": {
            "missingDocuments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["documentName", "documentType", "reason", "page", "priority"],
                    "properties": {
                        "documentName": { "type": "string" },
                        "documentType": { "type": "string" },
                        "reason": { "type": "string" },
                        "page": { "type": "integer" },
                        "priority": { "type": "string", "enum": ["high", "medium", "low"] },
                    }
                }
            },
            "recommendations": { "type": "array", "items": { "type": "string" } },
        }
    })
}

/// Extract the structured result from a chat completions response.
///
/// The model's answer is a JSON document inside
/// `choices[0].message.content`; a refusal is reported as an error.
pub fn parse_completion(json: &serde_json::Value) -> Result<PartialResult> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message"))?;

    if let Some(refusal) = message.get("refusal").and_then(|r| r.as_str()) {
        bail!("OpenAI refused the request: {}", refusal);
    }

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing message content"))?;

    serde_json::from_str(content).context("Invalid OpenAI response: content is not an analysis result")
}
