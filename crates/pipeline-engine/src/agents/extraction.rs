//! Distills each claimed queue item's abstract into zero or more draft
//! `ScientificClaim`s via the LLM's extraction capability. Grounded on
//! `extraction_agent.py`'s claim-then-extract-then-store flow, including
//! the documented quirk that an empty abstract completes the item with
//! zero claims rather than failing it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{Agent, AgentRunReport};
use crate::config::AgentSchedule;
use crate::error::PipelineError;
use crate::llm::LlmCapability;
use crate::store::Store;
use crate::types::{
    ClaimId, Provenance, QueueStatus, ResearchQueueItem, ScientificClaim, StudyMetadata,
};

pub struct ExtractionAgent {
    schedule: AgentSchedule,
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmCapability>,
}

impl ExtractionAgent {
    pub fn new(schedule: AgentSchedule, store: Arc<dyn Store>, llm: Arc<dyn LlmCapability>) -> Self {
        Self { schedule, store, llm }
    }

    async fn process_one(&self, item: &ResearchQueueItem) -> Result<u64, PipelineError> {
        // §7(e): an unavailable LLM capability degrades to zero claims
        // for this item rather than failing it outright.
        let extracted = match self
            .llm
            .extract_claims(&item.title, &item.authors, item.abstract_text.as_deref().unwrap_or(""))
            .await
        {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!(queue_item = %item.id, error = %e, "extraction capability unavailable, yielding zero claims");
                Vec::new()
            }
        };

        for claim in &extracted {
            let draft = ScientificClaim {
                id: ClaimId::new(),
                claim_text: claim.claim_text.clone(),
                summary: claim.summary.clone(),
                category: claim.category,
                evidence_level: claim.evidence_level,
                confidence_score: 0.8 * claim.confidence,
                status: crate::types::ClaimStatus::Draft,
                provenance: Provenance {
                    source_doi: item.doi.clone(),
                    source_url: item.url.clone(),
                    source_title: Some(item.title.clone()),
                    source_authors: item.authors.clone(),
                    publication_date: item.publication_date,
                },
                study: StudyMetadata {
                    sample_size: claim.sample_size,
                    study_design: claim.study_design,
                    population: claim.population.clone(),
                    effect_size: claim.effect_size,
                },
                key_findings: claim.key_findings.clone(),
                limitations: claim.limitations.clone(),
                conflicting_evidence: false,
                embedding_status: crate::types::EmbeddingStatus::Pending,
                embedding: None,
                embedding_error: None,
                auto_validated: false,
                duplicate_of: None,
                created_at: Utc::now(),
            };
            self.store.insert_draft(draft).await?;
        }

        Ok(extracted.len() as u64)
    }
}

#[async_trait]
impl Agent for ExtractionAgent {
    fn name(&self) -> &'static str {
        "extraction"
    }

    async fn process(&self) -> Result<AgentRunReport, PipelineError> {
        let items = self.store.claim_pending(self.schedule.batch_size).await?;
        let mut processed = 0u64;
        let mut errors = 0u64;
        let mut drafts_created = 0u64;

        for item in items {
            processed += 1;
            match self.process_one(&item).await {
                Ok(count) => {
                    drafts_created += count;
                    self.store.set_queue_status(item.id, QueueStatus::Completed, None).await?;
                }
                Err(e) => {
                    errors += 1;
                    tracing::error!(queue_item = %item.id, error = %e, "extraction failed");
                    self.store.set_queue_status(item.id, QueueStatus::Failed, Some(e.to_string())).await?;
                }
            }
        }

        Ok(AgentRunReport::new(processed, errors).with_details(serde_json::json!({ "drafts_created": drafts_created })))
    }
}
