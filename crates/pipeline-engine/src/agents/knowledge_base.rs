//! Finalizes accepted claims: generates embeddings for semantic recall
//! and accumulates per-category evidence-hierarchy scores. Grounded on
//! `kb_agent.py`'s embedding loop and hierarchy-score formula.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Agent, AgentRunReport};
use crate::config::AgentSchedule;
use crate::error::PipelineError;
use crate::llm::LlmCapability;
use crate::store::Store;
use crate::types::{EmbeddingStatus, EvidenceHierarchy, ScientificClaim};

pub struct KnowledgeBaseAgent {
    schedule: AgentSchedule,
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmCapability>,
}

impl KnowledgeBaseAgent {
    pub fn new(schedule: AgentSchedule, store: Arc<dyn Store>, llm: Arc<dyn LlmCapability>) -> Self {
        Self { schedule, store, llm }
    }

    /// Embeds one claim and writes the result, or marks the embedding
    /// `failed` with the error string rather than propagating it — a
    /// claim stuck on a transient LLM outage is retried next tick by
    /// `RebuildEmbeddings`, not by surfacing a batch-wide error.
    async fn embed_one(&self, claim: &ScientificClaim) -> Result<(), PipelineError> {
        match self.llm.embed(&claim.claim_text).await {
            Ok(vector) if !vector.is_empty() => {
                self.store.update_embedding(claim.id, Some(vector), EmbeddingStatus::Completed, None).await?;
            }
            Ok(_) => {
                self.store
                    .update_embedding(claim.id, None, EmbeddingStatus::Failed, Some("empty embedding generated".into()))
                    .await?;
            }
            Err(e) => {
                self.store.update_embedding(claim.id, None, EmbeddingStatus::Failed, Some(e.to_string())).await?;
            }
        }
        Ok(())
    }

    fn hierarchy_score(claim: &ScientificClaim) -> f64 {
        let base = 0.2 * claim.evidence_level as f64;
        let mut score = base * claim.confidence_score;
        score *= match claim.study.sample_size {
            Some(n) if n >= 1000 => 1.2,
            Some(n) if n >= 100 => 1.1,
            _ => 1.0,
        };
        if claim.conflicting_evidence {
            score *= 0.8;
        }
        score.min(1.0)
    }

    async fn update_hierarchy(&self, claim: &ScientificClaim) -> Result<(), PipelineError> {
        let topic = claim.category.to_string();
        let score = Self::hierarchy_score(claim);
        self.store
            .upsert_evidence(EvidenceHierarchy { topic, category: claim.category, total_score: score })
            .await?;
        Ok(())
    }

    /// Maintenance entry point: reruns embedding generation and
    /// hierarchy accumulation for every active claim, regardless of
    /// current embedding status.
    pub async fn rebuild_embeddings(&self) -> Result<AgentRunReport, PipelineError> {
        let claims = self.store.list_all_active(1000).await?;
        let mut processed = 0u64;
        let mut errors = 0u64;
        for claim in claims {
            processed += 1;
            if let Err(e) = self.embed_one(&claim).await {
                errors += 1;
                tracing::error!(claim = %claim.id, error = %e, "embedding rebuild failed");
            }
            if let Err(e) = self.update_hierarchy(&claim).await {
                errors += 1;
                tracing::error!(claim = %claim.id, error = %e, "hierarchy rebuild failed");
            }
        }
        Ok(AgentRunReport::new(processed, errors))
    }
}

#[async_trait]
impl Agent for KnowledgeBaseAgent {
    fn name(&self) -> &'static str {
        "knowledge_base"
    }

    async fn process(&self) -> Result<AgentRunReport, PipelineError> {
        let claims = self.store.lock_pending_embeddings(self.schedule.batch_size).await?;
        let mut processed = 0u64;
        let mut errors = 0u64;
        let mut embeddings_generated = 0u64;
        let mut hierarchy_updated = 0u64;

        for claim in &claims {
            processed += 1;
            match self.embed_one(claim).await {
                Ok(()) => embeddings_generated += 1,
                Err(e) => {
                    errors += 1;
                    tracing::error!(claim = %claim.id, error = %e, "embedding generation failed");
                }
            }
            match self.update_hierarchy(claim).await {
                Ok(()) => hierarchy_updated += 1,
                Err(e) => {
                    errors += 1;
                    tracing::error!(claim = %claim.id, error = %e, "hierarchy update failed");
                }
            }
        }

        Ok(AgentRunReport::new(processed, errors)
            .with_details(serde_json::json!({ "embeddings_generated": embeddings_generated, "hierarchy_updated": hierarchy_updated })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_double::StubLlm;
    use crate::store::mock::InMemoryStore;
    use crate::types::{Category, ClaimId, ClaimStatus, Provenance, StudyMetadata};
    use chrono::Utc;
    use std::time::Duration;

    fn schedule() -> AgentSchedule {
        AgentSchedule { interval: Duration::from_secs(60), batch_size: 10, enabled: true }
    }

    fn active_claim(evidence_level: u8, confidence: f64, sample_size: Option<u32>) -> ScientificClaim {
        ScientificClaim {
            id: ClaimId::new(),
            claim_text: "Training volume drives hypertrophy".into(),
            summary: "summary".into(),
            category: Category::Hypertrophy,
            evidence_level,
            confidence_score: confidence,
            status: ClaimStatus::Active,
            provenance: Provenance::default(),
            study: StudyMetadata { sample_size, ..Default::default() },
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
    async fn embeds_pending_claim_and_updates_hierarchy() {
        let store = Arc::new(InMemoryStore::new());
        let claim = active_claim(4, 0.8, Some(120));
        store.insert_draft(claim.clone()).await.unwrap();
        let llm = Arc::new(StubLlm::new(8));
        let agent = KnowledgeBaseAgent::new(schedule(), store.clone(), llm);

        let report = agent.process().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.errors, 0);

        let stored = store.get_claim(claim.id).await.unwrap();
        assert_eq!(stored.embedding_status, EmbeddingStatus::Completed);
        assert_eq!(stored.embedding.as_ref().unwrap().len(), 8);

        let hierarchy = store.get_evidence("hypertrophy", Category::Hypertrophy).await.unwrap().unwrap();
        // base = 0.2*4 = 0.8, score = 0.8*0.8 = 0.64, * 1.1 (sample>=100) = 0.704
        assert!((hierarchy.total_score - 0.704).abs() < 1e-9);
    }

    #[tokio::test]
    async fn embedding_failure_marks_failed_without_aborting_batch() {
        let store = Arc::new(InMemoryStore::new());
        let claim = active_claim(3, 0.7, None);
        store.insert_draft(claim.clone()).await.unwrap();
        let llm = Arc::new(StubLlm::new(8));
        llm.set_fail_embeddings(true);
        let agent = KnowledgeBaseAgent::new(schedule(), store.clone(), llm);

        let report = agent.process().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.errors, 0);

        let stored = store.get_claim(claim.id).await.unwrap();
        assert_eq!(stored.embedding_status, EmbeddingStatus::Failed);
        assert!(stored.embedding_error.is_some());
    }
}
