//! The late-bound LLM capability: a narrow interface agents depend on,
//! never a concrete provider. Two production implementations
//! (chat-style, embedding) and one deterministic test double ship
//! behind it.

pub mod chat;
pub mod embedding;
pub mod production;
pub mod test_double;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::store::SimilarClaim;
use crate::types::{Category, EvidenceLevel, StudyDesign};

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedClaim {
    pub claim_text: String,
    pub summary: String,
    pub evidence_level: EvidenceLevel,
    pub sample_size: Option<u32>,
    pub effect_size: Option<f64>,
    pub study_design: Option<StudyDesign>,
    pub population: Option<String>,
    pub key_findings: Vec<String>,
    pub limitations: Option<String>,
    pub category: Category,
    /// [0,1]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationNeighbor {
    pub claim_text: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub rejection_reasons: Vec<String>,
    pub duplicate_of_index: Option<usize>,
    pub conflicts_with_indices: Vec<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictVerdict {
    pub conflict_detected: bool,
    pub relationship_type: String,
    pub confidence: f64,
    pub explanation: String,
}

/// The capability interface every agent consumes. Implementors must
/// degrade gracefully rather than panic: callers treat a returned
/// `LlmError` as an expected, recoverable condition.
#[async_trait]
pub trait LlmCapability: Send + Sync {
    async fn extract_claims(
        &self,
        title: &str,
        authors: &[String],
        abstract_text: &str,
    ) -> Result<Vec<ExtractedClaim>, LlmError>;

    async fn validate_claim(
        &self,
        claim_text: &str,
        category: Category,
        evidence_level: EvidenceLevel,
        study_design: Option<StudyDesign>,
        sample_size: Option<u32>,
        effect_size: Option<f64>,
        neighbors: &[SimilarClaim],
    ) -> Result<ValidationVerdict, LlmError>;

    async fn detect_conflict(&self, claim_a: &str, claim_b: &str) -> Result<ConflictVerdict, LlmError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Strip a ```` ```json ```` / ```` ``` ```` fence a chat model commonly
/// wraps structured output in before handing it to `serde_json`.
pub fn strip_markdown_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_markdown_fence(raw), "{\"a\":1}");
    }

    #[test]
    fn strips_plain_fence() {
        let raw = "```\n[1,2,3]\n```";
        assert_eq!(strip_markdown_fence(raw), "[1,2,3]");
    }

    #[test]
    fn passes_through_unfenced() {
        assert_eq!(strip_markdown_fence("{\"a\":1}"), "{\"a\":1}");
    }
}
