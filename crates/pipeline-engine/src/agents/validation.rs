//! Accepts or rejects draft claims: an auto-validation short-circuit for
//! high-evidence trusted-journal claims, then a duplicate/conflict scan
//! against the store's similarity search, an LLM validation pass, and a
//! scored accept/reject decision. Grounded on `validation_agent.py`'s
//! five-step protocol.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Agent, AgentRunReport};
use crate::config::ValidationConfig;
use crate::error::PipelineError;
use crate::llm::LlmCapability;
use crate::store::{ClaimPatch, SimilarClaim, Store};
use crate::types::{ClaimId, ClaimStatus, KnowledgeRelationship, RelationshipType, ScientificClaim, StudyDesign};
use crate::util::text::{contains_negation, token_overlap};

const AUTO_VALIDATE_MIN_EVIDENCE: u8 = 4;
const AUTO_VALIDATE_SCORE: f64 = 0.95;
const DUPLICATE_THRESHOLD: f64 = 0.95;
const ACCEPT_SCORE_THRESHOLD: f64 = 0.6;
/// §4.4 step 3 / §7(e): in the LLM's absence, a candidate conflict
/// fires on shared vocabulary plus asymmetric negation, same heuristic
/// the Conflict agent uses.
const CONFLICT_HEURISTIC_MIN_OVERLAP: usize = 3;

fn heuristic_conflict(a: &str, b: &str) -> bool {
    token_overlap(a, b) >= CONFLICT_HEURISTIC_MIN_OVERLAP && contains_negation(a) != contains_negation(b)
}

pub struct ValidationAgent {
    config: ValidationConfig,
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmCapability>,
}

enum Outcome {
    Approved,
    AutoValidated,
    Rejected,
}

struct Assessment {
    rejection_reasons: Vec<String>,
    duplicate_of: Option<ClaimId>,
    conflicts_with: Vec<ClaimId>,
    score: f64,
}

impl ValidationAgent {
    pub fn new(config: ValidationConfig, store: Arc<dyn Store>, llm: Arc<dyn LlmCapability>) -> Self {
        Self { config, store, llm }
    }

    fn is_auto_validatable(&self, claim: &ScientificClaim, trusted_journals: &[String]) -> bool {
        if claim.provenance.source_doi.is_none() {
            return false;
        }
        if claim.evidence_level < AUTO_VALIDATE_MIN_EVIDENCE {
            return false;
        }
        if !matches!(claim.study.study_design, Some(StudyDesign::MetaAnalysis) | Some(StudyDesign::SystematicReview)) {
            return false;
        }
        let Some(source_title) = claim.provenance.source_title.as_deref() else { return false };
        let lower = source_title.to_lowercase();
        trusted_journals.iter().any(|j| lower.contains(j.as_str()))
    }

    async fn auto_validate(&self, claim: &ScientificClaim) -> Result<(), PipelineError> {
        self.store
            .update_claim(
                claim.id,
                ClaimPatch {
                    status: Some(ClaimStatus::Active),
                    confidence_score: Some(AUTO_VALIDATE_SCORE),
                    auto_validated: Some(true),
                    conflicting_evidence: Some(false),
                    duplicate_of: None,
                },
            )
            .await?;
        Ok(())
    }

    /// Steps 2-5 of the protocol: evidence gate, duplicate/conflict
    /// search, LLM validation, and scoring.
    async fn assess(&self, claim: &ScientificClaim) -> Result<Assessment, PipelineError> {
        let mut rejection_reasons = Vec::new();
        let mut duplicate_of = None;
        let mut conflicts_with = Vec::new();

        if claim.evidence_level < self.config.min_evidence_level {
            rejection_reasons.push(format!(
                "evidence level {} below minimum {}",
                claim.evidence_level, self.config.min_evidence_level
            ));
        }

        let mut neighbors: Vec<SimilarClaim> = Vec::new();
        if let Ok(embedding) = self.llm.embed(&claim.claim_text).await {
            neighbors = self
                .store
                .find_similar(&embedding, self.config.similarity_threshold - 0.1, 5, None, None)
                .await?
                .into_iter()
                .filter(|n| n.id != claim.id)
                .collect();

            for neighbor in &neighbors {
                if neighbor.similarity > DUPLICATE_THRESHOLD {
                    duplicate_of = Some(neighbor.id);
                    rejection_reasons.push(format!("duplicate of claim {}", neighbor.id));
                    break;
                } else if neighbor.similarity > self.config.similarity_threshold {
                    let conflict_detected = match self.llm.detect_conflict(&claim.claim_text, &neighbor.claim.claim_text).await {
                        Ok(verdict) => verdict.conflict_detected,
                        Err(e) => {
                            tracing::warn!(claim = %claim.id, neighbor = %neighbor.id, error = %e, "conflict capability unavailable, using heuristic");
                            heuristic_conflict(&claim.claim_text, &neighbor.claim.claim_text)
                        }
                    };
                    if conflict_detected {
                        conflicts_with.push(neighbor.id);
                    }
                }
            }
        }

        if duplicate_of.is_none() {
            let verdict = self
                .llm
                .validate_claim(
                    &claim.claim_text,
                    claim.category,
                    claim.evidence_level,
                    claim.study.study_design,
                    claim.study.sample_size,
                    claim.study.effect_size,
                    &neighbors,
                )
                .await?;
            if !verdict.is_valid {
                rejection_reasons.extend(verdict.rejection_reasons);
            }
            if let Some(index) = verdict.duplicate_of_index {
                if let Some(neighbor) = neighbors.get(index) {
                    duplicate_of = Some(neighbor.id);
                    rejection_reasons.push(format!("duplicate of claim {}", neighbor.id));
                }
            }
            for index in verdict.conflicts_with_indices {
                if let Some(neighbor) = neighbors.get(index) {
                    if !conflicts_with.contains(&neighbor.id) {
                        conflicts_with.push(neighbor.id);
                    }
                }
            }
        }

        let mut score = claim.confidence_score;
        score += 0.05 * (claim.evidence_level as f64 - 1.0);
        score += match claim.study.sample_size {
            Some(n) if n >= 100 => 0.1,
            Some(n) if n >= 50 => 0.05,
            _ => 0.0,
        };
        score -= 0.2 * rejection_reasons.len() as f64;
        score -= 0.05 * neighbors.len() as f64;
        let score = score.clamp(0.0, 1.0);

        Ok(Assessment { rejection_reasons, duplicate_of, conflicts_with, score })
    }

    async fn accept(&self, claim: &ScientificClaim, assessment: &Assessment) -> Result<(), PipelineError> {
        self.store
            .update_claim(
                claim.id,
                ClaimPatch {
                    status: Some(ClaimStatus::Active),
                    confidence_score: Some(assessment.score),
                    conflicting_evidence: Some(!assessment.conflicts_with.is_empty()),
                    auto_validated: None,
                    duplicate_of: None,
                },
            )
            .await?;
        for target in &assessment.conflicts_with {
            let relationship = KnowledgeRelationship::new(
                claim.id,
                *target,
                RelationshipType::Contradicts,
                0.7,
                Some("detected during validation".into()),
            )
            .expect("distinct claim ids");
            self.store.add_relationship(relationship).await?;
        }
        Ok(())
    }

    async fn reject(&self, claim: &ScientificClaim, assessment: &Assessment) -> Result<(), PipelineError> {
        self.store
            .update_claim(
                claim.id,
                ClaimPatch {
                    status: Some(ClaimStatus::Deprecated),
                    confidence_score: Some(assessment.score),
                    conflicting_evidence: None,
                    auto_validated: None,
                    duplicate_of: assessment.duplicate_of,
                },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Agent for ValidationAgent {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn process(&self) -> Result<AgentRunReport, PipelineError> {
        let drafts = self.store.list_draft_claims(self.config.schedule.batch_size).await?;
        let trusted_journals: Vec<String> = self
            .store
            .list_trusted_journals()
            .await?
            .into_iter()
            .map(|j| j.normalized_name.to_lowercase())
            .collect();

        let mut approved = 0u64;
        let mut rejected = 0u64;
        let mut auto_validated = 0u64;
        let mut errors = 0u64;

        for claim in drafts {
            let outcome = if self.is_auto_validatable(&claim, &trusted_journals) {
                self.auto_validate(&claim).await.map(|_| Outcome::AutoValidated)
            } else {
                match self.assess(&claim).await {
                    Ok(assessment) => {
                        let accept =
                            assessment.rejection_reasons.is_empty() && assessment.score >= ACCEPT_SCORE_THRESHOLD && assessment.duplicate_of.is_none();
                        let result = if accept { self.accept(&claim, &assessment).await } else { self.reject(&claim, &assessment).await };
                        result.map(|_| if accept { Outcome::Approved } else { Outcome::Rejected })
                    }
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Ok(Outcome::AutoValidated) => {
                    approved += 1;
                    auto_validated += 1;
                }
                Ok(Outcome::Approved) => approved += 1,
                Ok(Outcome::Rejected) => rejected += 1,
                Err(e) => {
                    errors += 1;
                    tracing::error!(claim = %claim.id, error = %e, "validation failed");
                }
            }
        }

        Ok(AgentRunReport::new(approved + rejected, errors).with_details(serde_json::json!({
            "approved": approved,
            "rejected": rejected,
            "auto_validated": auto_validated,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentSchedule;
    use crate::llm::test_double::StubLlm;
    use crate::store::mock::InMemoryStore;
    use crate::types::{Category, EmbeddingStatus, Provenance, StudyMetadata, TrustedSource};
    use chrono::Utc;
    use std::time::Duration;

    fn config() -> ValidationConfig {
        ValidationConfig {
            schedule: AgentSchedule { interval: Duration::from_secs(60), batch_size: 10, enabled: true },
            min_evidence_level: 2,
            similarity_threshold: 0.85,
        }
    }

    fn draft_claim(evidence_level: u8, confidence: f64) -> ScientificClaim {
        ScientificClaim {
            id: ClaimId::new(),
            claim_text: "High volume increases hypertrophy".into(),
            summary: "summary".into(),
            category: Category::Hypertrophy,
            evidence_level,
            confidence_score: confidence,
            status: ClaimStatus::Draft,
            provenance: Provenance::default(),
            study: StudyMetadata { sample_size: Some(80), ..Default::default() },
            key_findings: vec![],
            limitations: None,
            conflicting_evidence: false,
            embedding_status: EmbeddingStatus::Pending,
            embedding: None,
            embedding_error: None,
            auto_validated: false,
            duplicate_of: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn below_evidence_floor_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let claim = draft_claim(1, 0.9);
        store.insert_draft(claim.clone()).await.unwrap();
        let llm = Arc::new(StubLlm::new(8));
        let agent = ValidationAgent::new(config(), store.clone(), llm);

        let report = agent.process().await.unwrap();
        assert_eq!(report.details["rejected"], 1);
        let stored = store.get_claim(claim.id).await.unwrap();
        assert_eq!(stored.status, ClaimStatus::Deprecated);
    }

    #[tokio::test]
    async fn high_confidence_claim_is_approved() {
        let store = Arc::new(InMemoryStore::new());
        let claim = draft_claim(4, 0.9);
        store.insert_draft(claim.clone()).await.unwrap();
        let llm = Arc::new(StubLlm::new(8));
        let agent = ValidationAgent::new(config(), store.clone(), llm);

        let report = agent.process().await.unwrap();
        assert_eq!(report.details["approved"], 1);
        let stored = store.get_claim(claim.id).await.unwrap();
        assert_eq!(stored.status, ClaimStatus::Active);
    }

    #[tokio::test]
    async fn trusted_journal_meta_analysis_auto_validates() {
        let store = Arc::new(InMemoryStore::with_trusted_sources(
            vec![],
            vec![TrustedSource { normalized_name: "journal of the international society of sports nutrition".into(), priority_boost: 2 }],
        ));
        let mut claim = draft_claim(5, 0.5);
        claim.provenance.source_doi = Some("10.1/x".into());
        claim.provenance.source_title = Some("Journal of the International Society of Sports Nutrition, vol 20".into());
        claim.study.study_design = Some(StudyDesign::MetaAnalysis);
        store.insert_draft(claim.clone()).await.unwrap();

        let llm = Arc::new(StubLlm::new(8));
        let agent = ValidationAgent::new(config(), store.clone(), llm);
        let report = agent.process().await.unwrap();
        assert_eq!(report.details["auto_validated"], 1);

        let stored = store.get_claim(claim.id).await.unwrap();
        assert_eq!(stored.status, ClaimStatus::Active);
        assert!(stored.auto_validated);
        assert_eq!(stored.confidence_score, AUTO_VALIDATE_SCORE);
    }
}
