//! Composes the chat and embedding transports behind the single
//! [`LlmCapability`] trait object every agent depends on.

use async_trait::async_trait;

use super::chat::ChatLlm;
use super::embedding::EmbeddingLlm;
use super::{ConflictVerdict, ExtractedClaim, LlmCapability, ValidationVerdict};
use crate::error::LlmError;
use crate::store::SimilarClaim;
use crate::types::{Category, EvidenceLevel, StudyDesign};

pub struct ProductionLlm {
    pub chat: ChatLlm,
    pub embedding: EmbeddingLlm,
}

impl ProductionLlm {
    pub fn new(chat: ChatLlm, embedding: EmbeddingLlm) -> Self {
        Self { chat, embedding }
    }
}

#[async_trait]
impl LlmCapability for ProductionLlm {
    async fn extract_claims(
        &self,
        title: &str,
        authors: &[String],
        abstract_text: &str,
    ) -> Result<Vec<ExtractedClaim>, LlmError> {
        self.chat.extract_claims(title, authors, abstract_text).await
    }

    async fn validate_claim(
        &self,
        claim_text: &str,
        category: Category,
        evidence_level: EvidenceLevel,
        study_design: Option<StudyDesign>,
        sample_size: Option<u32>,
        effect_size: Option<f64>,
        neighbors: &[SimilarClaim],
    ) -> Result<ValidationVerdict, LlmError> {
        self.chat
            .validate_claim(claim_text, category, evidence_level, study_design, sample_size, effect_size, neighbors)
            .await
    }

    async fn detect_conflict(&self, claim_a: &str, claim_b: &str) -> Result<ConflictVerdict, LlmError> {
        self.chat.detect_conflict(claim_a, claim_b).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embedding.embed(text).await
    }
}
