//! Cache key derivation for analysis results.
//!
//! A cached result is valid for a `(document_id, analysis_type,
//! specification_hash)` triple. The hash is the SHA-256 of a canonical JSON
//! rendering of everything that can change the answer: the specification
//! itself (with `existing_documents` sorted, since their order carries no
//! meaning) and the batching knobs, because batch boundaries decide what
//! each inference call sees.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::batch::BatchConstraints;
use crate::models::{AnalysisSpecification, AnalysisType};
use crate::plan::CallBudget;

/// Identity of one cached analysis result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub document_id: i64,
    pub analysis_type: AnalysisType,
    pub specification_hash: String,
}

impl CacheKey {
    pub fn new(
        specification: &AnalysisSpecification,
        constraints: BatchConstraints,
        budget: CallBudget,
    ) -> Self {
        Self {
            document_id: specification.document_id,
            analysis_type: specification.analysis_type,
            specification_hash: specification_hash(specification, constraints, budget),
        }
    }
}

/// Hex-encoded SHA-256 over the canonical form of the inputs.
pub fn specification_hash(
    specification: &AnalysisSpecification,
    constraints: BatchConstraints,
    budget: CallBudget,
) -> String {
    let mut existing = specification.existing_documents.clone();
    existing.sort();

    let canonical = serde_json::json!({
        "type": specification.analysis_type,
        "includeRelatedDocs": specification.include_related_docs,
        "existingDocuments": existing,
        "title": specification.title,
        "category": specification.category,
        "companyId": specification.company_id,
        "documentId": specification.document_id,
        "maxChunksPerCall": constraints.max_chunks_per_call,
        "maxCharactersPerCall": constraints.max_characters_per_call,
        "maxAiCalls": budget.max_ai_calls,
        "budgetPolicy": budget.policy,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::BudgetPolicy;

    fn spec() -> AnalysisSpecification {
        AnalysisSpecification {
            analysis_type: AnalysisType::Contract,
            include_related_docs: false,
            existing_documents: vec!["Schedule 1".into(), "Exhibit B".into()],
            title: "Master Services Agreement".into(),
            category: "legal".into(),
            company_id: 3,
            document_id: 99,
        }
    }

    #[test]
    fn test_hash_is_stable_and_hex() {
        let a = specification_hash(&spec(), BatchConstraints::new(8, 12000), CallBudget::default());
        let b = specification_hash(&spec(), BatchConstraints::new(8, 12000), CallBudget::default());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_existing_document_order_ignored() {
        let mut reordered = spec();
        reordered.existing_documents.reverse();
        let c = BatchConstraints::new(8, 12000);
        assert_eq!(
            specification_hash(&spec(), c, CallBudget::default()),
            specification_hash(&reordered, c, CallBudget::default())
        );
    }

    #[test]
    fn test_inputs_that_change_the_answer_change_the_hash() {
        let c = BatchConstraints::new(8, 12000);
        let base = specification_hash(&spec(), c, CallBudget::default());

        let mut related = spec();
        related.include_related_docs = true;
        assert_ne!(base, specification_hash(&related, c, CallBudget::default()));

        assert_ne!(
            base,
            specification_hash(&spec(), BatchConstraints::new(4, 12000), CallBudget::default())
        );
        assert_ne!(
            base,
            specification_hash(&spec(), c, CallBudget::new(12, BudgetPolicy::CharacterCeiling))
        );
    }

    #[test]
    fn test_key_fields() {
        let key = CacheKey::new(&spec(), BatchConstraints::new(8, 12000), CallBudget::default());
        assert_eq!(key.document_id, 99);
        assert_eq!(key.analysis_type, AnalysisType::Contract);
    }
}
