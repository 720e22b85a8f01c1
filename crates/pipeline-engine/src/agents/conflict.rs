//! Scans active claims for contradicting neighbors, both via semantic
//! similarity + LLM adjudication and via a cheap evidence-level
//! heuristic. Grounded on `conflict_agent.py`'s neighbor scan and
//! `analyze_conflict_network`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Agent, AgentRunReport};
use crate::config::ConflictConfig;
use crate::error::PipelineError;
use crate::llm::LlmCapability;
use crate::store::{ClaimPatch, Store};
use crate::types::{ClaimId, KnowledgeRelationship, RelationshipType, ScientificClaim};
use crate::util::text::{contains_negation, token_overlap};

/// Evidence-level heuristic requires at least this many shared tokens
/// before two same-category claims are flagged as conflicting, to avoid
/// pairing claims that merely share a topic word.
const MIN_TOKEN_OVERLAP: usize = 2;
const EVIDENCE_HEURISTIC_CONFIDENCE: f64 = 0.6;

/// §4.6/§7(e): in the LLM's absence, a conflict fires when the claims
/// share ≥3 tokens and exactly one contains a negation marker.
const SEMANTIC_HEURISTIC_MIN_OVERLAP: usize = 3;
const SEMANTIC_HEURISTIC_CONFIDENCE: f64 = 0.6;

fn heuristic_conflict(a: &str, b: &str) -> bool {
    token_overlap(a, b) >= SEMANTIC_HEURISTIC_MIN_OVERLAP && contains_negation(a) != contains_negation(b)
}

pub struct ConflictAgent {
    config: ConflictConfig,
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmCapability>,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct ConflictNetworkSummary {
    pub total_conflicting_claims: usize,
    pub total_relationships: usize,
    pub most_contradicted: Vec<(ClaimId, usize)>,
}

impl ConflictAgent {
    pub fn new(config: ConflictConfig, store: Arc<dyn Store>, llm: Arc<dyn LlmCapability>) -> Self {
        Self { config, store, llm }
    }

    /// Finds semantic neighbors via the claim's own embedding and asks
    /// the LLM to adjudicate each one; the store's `find_similar` already
    /// excludes the query claim unless its id happens to match, so this
    /// double-checks by id before comparing.
    async fn check_semantic_conflicts(&self, claim: &ScientificClaim) -> Result<usize, PipelineError> {
        let Some(embedding) = &claim.embedding else { return Ok(0) };
        let neighbors = self
            .store
            .find_similar(embedding, self.config.similarity_threshold, 5, None, None)
            .await?;

        let mut found = 0;
        for neighbor in neighbors {
            if neighbor.id == claim.id {
                continue;
            }
            // §7(e): capability unavailable degrades to the
            // token-overlap/negation heuristic rather than failing the
            // whole scan.
            let (conflict_detected, confidence, note) =
                match self.llm.detect_conflict(&claim.claim_text, &neighbor.claim.claim_text).await {
                    Ok(verdict) => (verdict.conflict_detected, verdict.confidence, Some(verdict.explanation)),
                    Err(e) => {
                        tracing::warn!(claim = %claim.id, neighbor = %neighbor.id, error = %e, "conflict capability unavailable, using heuristic");
                        let detected = heuristic_conflict(&claim.claim_text, &neighbor.claim.claim_text);
                        (detected, SEMANTIC_HEURISTIC_CONFIDENCE, None)
                    }
                };
            if !conflict_detected {
                continue;
            }
            self.record_conflict(claim.id, neighbor.id, confidence, note).await?;
            found += 1;
        }
        Ok(found)
    }

    /// Flags a same-category claim whose evidence level is strictly
    /// higher and which shares enough vocabulary to plausibly be about
    /// the same question, without waiting on an embedding or an LLM call.
    async fn check_evidence_level_conflicts(&self, claim: &ScientificClaim) -> Result<usize, PipelineError> {
        let peers = self
            .store
            .list_by_category_filtered(claim.category, 0, 0.0, 100)
            .await?;

        let mut found = 0;
        for peer in peers {
            if peer.id == claim.id || peer.evidence_level <= claim.evidence_level {
                continue;
            }
            if token_overlap(&claim.claim_text, &peer.claim_text) < MIN_TOKEN_OVERLAP {
                continue;
            }
            self.record_conflict(claim.id, peer.id, EVIDENCE_HEURISTIC_CONFIDENCE, None).await?;
            found += 1;
        }
        Ok(found)
    }

    /// Writes a `contradicts` relationship (source → target) and flags
    /// only the source claim, per spec §4.6 — the target claim's own
    /// flag is set, if at all, when the sweep later visits it as a
    /// source in its own right.
    async fn record_conflict(
        &self,
        claim_id: ClaimId,
        other_id: ClaimId,
        confidence: f64,
        note: Option<String>,
    ) -> Result<(), PipelineError> {
        let relationship = KnowledgeRelationship::new(claim_id, other_id, RelationshipType::Contradicts, confidence, note)
            .expect("conflict candidates are already filtered to distinct claim ids");
        self.store.add_relationship(relationship).await?;
        self.store
            .update_claim(
                claim_id,
                ClaimPatch { conflicting_evidence: Some(true), ..Default::default() },
            )
            .await?;
        Ok(())
    }

    /// Diagnostic summary: the five most-contradicted claims plus an
    /// overall count, used for operator reporting rather than the
    /// scheduled sweep itself.
    pub async fn analyze_network(&self) -> Result<ConflictNetworkSummary, PipelineError> {
        let claims = self.store.list_all_active(1000).await?;
        let conflicting: Vec<&ScientificClaim> = claims.iter().filter(|c| c.conflicting_evidence).collect();

        let mut counts: Vec<(ClaimId, usize)> = Vec::new();
        let mut total_relationships = 0usize;
        for claim in &conflicting {
            let relationships = self.store.relationships_for(claim.id).await?;
            let contradicts = relationships.iter().filter(|r| r.relationship_type == RelationshipType::Contradicts).count();
            total_relationships += contradicts;
            counts.push((claim.id, contradicts));
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.truncate(5);

        Ok(ConflictNetworkSummary {
            total_conflicting_claims: conflicting.len(),
            total_relationships,
            most_contradicted: counts,
        })
    }
}

#[async_trait]
impl Agent for ConflictAgent {
    fn name(&self) -> &'static str {
        "conflict"
    }

    async fn process(&self) -> Result<AgentRunReport, PipelineError> {
        let claims = self.store.list_all_active(self.config.schedule.batch_size * 4).await?;
        let candidates: Vec<ScientificClaim> = claims.into_iter().filter(|c| !c.conflicting_evidence).collect();

        let mut processed = 0u64;
        let mut errors = 0u64;
        let mut conflicts_found = 0u64;

        for claim in candidates.iter().take(self.config.schedule.batch_size) {
            processed += 1;
            let semantic = self.check_semantic_conflicts(claim).await;
            let heuristic = self.check_evidence_level_conflicts(claim).await;
            match (semantic, heuristic) {
                (Ok(a), Ok(b)) => conflicts_found += (a + b) as u64,
                (result_a, result_b) => {
                    errors += 1;
                    if let Err(e) = result_a {
                        tracing::error!(claim = %claim.id, error = %e, "semantic conflict check failed");
                    }
                    if let Err(e) = result_b {
                        tracing::error!(claim = %claim.id, error = %e, "evidence-level conflict check failed");
                    }
                }
            }
        }

        Ok(AgentRunReport::new(processed, errors).with_details(serde_json::json!({ "conflicts_found": conflicts_found })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_double::StubLlm;
    use crate::llm::ConflictVerdict;
    use crate::store::mock::InMemoryStore;
    use crate::types::{Category, ClaimStatus, EmbeddingStatus, Provenance, StudyMetadata};
    use chrono::Utc;
    use std::time::Duration;

    fn schedule() -> ConflictConfig {
        ConflictConfig {
            schedule: crate::config::AgentSchedule { interval: Duration::from_secs(60), batch_size: 10, enabled: true },
            similarity_threshold: 0.75,
        }
    }

    fn claim(text: &str, evidence_level: u8, embedding: Option<Vec<f32>>) -> ScientificClaim {
        ScientificClaim {
            id: ClaimId::new(),
            claim_text: text.into(),
            summary: "summary".into(),
            category: Category::Hypertrophy,
            evidence_level,
            confidence_score: 0.8,
            status: ClaimStatus::Active,
            provenance: Provenance::default(),
            study: StudyMetadata::default(),
            key_findings: vec![],
            limitations: None,
            conflicting_evidence: false,
            embedding_status: if embedding.is_some() { EmbeddingStatus::Completed } else { EmbeddingStatus::Pending },
            embedding,
            embedding_error: None,
            auto_validated: false,
            duplicate_of: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn semantic_conflict_creates_relationship_and_flags_both_claims() {
        let store = Arc::new(InMemoryStore::new());
        let a = claim("High training volume increases hypertrophy", 3, Some(vec![1.0, 0.0, 0.0]));
        let b = claim("High training volume does not increase hypertrophy", 3, Some(vec![0.99, 0.01, 0.0]));
        store.insert_draft(a.clone()).await.unwrap();
        store.insert_draft(b.clone()).await.unwrap();

        let llm = Arc::new(StubLlm::new(3).with_conflict_verdict(ConflictVerdict {
            conflict_detected: true,
            relationship_type: "contradicts".into(),
            confidence: 0.9,
            explanation: "opposing directionality".into(),
        }));
        let agent = ConflictAgent::new(schedule(), store.clone(), llm);

        let report = agent.process().await.unwrap();
        assert_eq!(report.errors, 0);
        assert!(report.details["conflicts_found"].as_u64().unwrap() >= 1);

        let stored_a = store.get_claim(a.id).await.unwrap();
        assert!(stored_a.conflicting_evidence);
    }

    #[tokio::test]
    async fn evidence_level_heuristic_flags_higher_quality_contradiction() {
        let store = Arc::new(InMemoryStore::new());
        let weak = claim("Short rest periods maximize hypertrophy gains", 2, None);
        let strong = claim("Short rest periods do not maximize hypertrophy gains", 5, None);
        store.insert_draft(weak.clone()).await.unwrap();
        store.insert_draft(strong.clone()).await.unwrap();

        let llm = Arc::new(StubLlm::new(3));
        let agent = ConflictAgent::new(schedule(), store.clone(), llm);

        let report = agent.process().await.unwrap();
        assert_eq!(report.errors, 0);
        assert!(report.details["conflicts_found"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn already_flagged_claims_are_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let mut a = claim("Progressive overload drives strength gains", 3, None);
        a.conflicting_evidence = true;
        store.insert_draft(a.clone()).await.unwrap();

        let llm = Arc::new(StubLlm::new(3));
        let agent = ConflictAgent::new(schedule(), store.clone(), llm);
        let report = agent.process().await.unwrap();
        assert_eq!(report.processed, 0);
    }
}
