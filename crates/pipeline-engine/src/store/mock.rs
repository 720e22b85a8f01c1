//! An in-process `Store` implementation backed by `tokio::sync::RwLock`
//! guarded collections. This is the store every agent unit test and
//! integration test runs against; no concrete SQL/vector-index backend
//! ships here by design (spec §1 Non-goal).

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{ClaimPatch, SimilarClaim, Store};
use crate::error::StoreError;
use crate::types::*;

#[derive(Default)]
struct Tables {
    queue: HashMap<QueueItemId, ResearchQueueItem>,
    claims: HashMap<ClaimId, ScientificClaim>,
    relationships: HashMap<RelationshipId, KnowledgeRelationship>,
    evidence: HashMap<(String, String), EvidenceHierarchy>,
    prompts: HashMap<PromptVersionId, PromptVersion>,
    trusted_authors: Vec<TrustedSource>,
    trusted_journals: Vec<TrustedSource>,
    /// Claim ids flipped out of every other worker's view by
    /// `lock_pending_embeddings` but not yet resolved by
    /// `update_embedding`. `embedding_status` itself stays `Pending`
    /// for these rows (the public state machine has no "processing"
    /// variant) — this set is the worker-local marker spec §9 Open
    /// Question #3 calls for.
    embeddings_in_flight: HashSet<ClaimId>,
}

pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { tables: RwLock::new(Tables::default()) }
    }

    pub fn with_trusted_sources(authors: Vec<TrustedSource>, journals: Vec<TrustedSource>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                trusted_authors: authors,
                trusted_journals: journals,
                ..Tables::default()
            }),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

#[async_trait]
impl Store for InMemoryStore {
    async fn enqueue_candidate(&self, item: ResearchQueueItem) -> Result<QueueItemId, StoreError> {
        let id = item.id;
        self.tables.write().await.queue.insert(id, item);
        Ok(id)
    }

    async fn find_queue_item_by_identity(
        &self,
        doi: Option<&str>,
        url: Option<&str>,
    ) -> Result<Option<ResearchQueueItem>, StoreError> {
        let tables = self.tables.read().await;
        let found = tables.queue.values().find(|item| {
            (doi.is_some() && item.doi.as_deref() == doi) || (url.is_some() && item.url.as_deref() == url)
        });
        Ok(found.cloned())
    }

    async fn claim_pending(&self, limit: usize) -> Result<Vec<ResearchQueueItem>, StoreError> {
        let mut tables = self.tables.write().await;
        let mut candidates: Vec<ResearchQueueItem> = tables
            .queue
            .values()
            .filter(|i| i.status == QueueStatus::Pending)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        candidates.truncate(limit);
        for item in &candidates {
            if let Some(stored) = tables.queue.get_mut(&item.id) {
                stored.status = QueueStatus::Processing;
            }
        }
        Ok(candidates
            .into_iter()
            .map(|mut i| {
                i.status = QueueStatus::Processing;
                i
            })
            .collect())
    }

    async fn set_queue_status(
        &self,
        id: QueueItemId,
        status: QueueStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let item = tables
            .queue
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("queue item {id}")))?;
        item.status = status;
        item.error = error;
        Ok(())
    }

    async fn insert_draft(&self, claim: ScientificClaim) -> Result<ClaimId, StoreError> {
        let id = claim.id;
        let mut claim = claim;
        claim.embedding_status = EmbeddingStatus::Pending;
        self.tables.write().await.claims.insert(id, claim);
        Ok(id)
    }

    async fn get_claim(&self, id: ClaimId) -> Result<ScientificClaim, StoreError> {
        self.tables
            .read()
            .await
            .claims
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("claim {id}")))
    }

    async fn update_claim(&self, id: ClaimId, patch: ClaimPatch) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let claim = tables
            .claims
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("claim {id}")))?;
        if let Some(status) = patch.status {
            claim.status = status;
        }
        if let Some(flag) = patch.conflicting_evidence {
            claim.conflicting_evidence = flag;
        }
        if let Some(flag) = patch.auto_validated {
            claim.auto_validated = flag;
        }
        if let Some(dup) = patch.duplicate_of {
            claim.duplicate_of = Some(dup);
        }
        if let Some(score) = patch.confidence_score {
            claim.confidence_score = score;
        }
        Ok(())
    }

    async fn list_draft_claims(&self, limit: usize) -> Result<Vec<ScientificClaim>, StoreError> {
        let tables = self.tables.read().await;
        let mut drafts: Vec<ScientificClaim> = tables
            .claims
            .values()
            .filter(|c| c.status == ClaimStatus::Draft)
            .cloned()
            .collect();
        drafts.sort_by_key(|c| c.created_at);
        drafts.truncate(limit);
        Ok(drafts)
    }

    async fn list_by_category_filtered(
        &self,
        category: Category,
        min_evidence: EvidenceLevel,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<ScientificClaim>, StoreError> {
        let tables = self.tables.read().await;
        let mut claims: Vec<ScientificClaim> = tables
            .claims
            .values()
            .filter(|c| {
                c.status == ClaimStatus::Active
                    && c.category == category
                    && c.evidence_level >= min_evidence
                    && c.confidence_score >= min_confidence
            })
            .cloned()
            .collect();
        claims.sort_by(|a, b| {
            b.evidence_level
                .cmp(&a.evidence_level)
                .then(b.confidence_score.partial_cmp(&a.confidence_score).unwrap())
        });
        claims.truncate(limit);
        Ok(claims)
    }

    async fn list_all_active(&self, limit: usize) -> Result<Vec<ScientificClaim>, StoreError> {
        let tables = self.tables.read().await;
        let mut claims: Vec<ScientificClaim> = tables
            .claims
            .values()
            .filter(|c| c.status == ClaimStatus::Active)
            .cloned()
            .collect();
        claims.sort_by_key(|c| c.created_at);
        claims.truncate(limit);
        Ok(claims)
    }

    async fn lock_pending_embeddings(&self, limit: usize) -> Result<Vec<ScientificClaim>, StoreError> {
        let mut tables = self.tables.write().await;
        let mut ids: Vec<ClaimId> = tables
            .claims
            .values()
            .filter(|c| c.embedding_status == EmbeddingStatus::Pending && !tables.embeddings_in_flight.contains(&c.id))
            .map(|c| c.id)
            .collect();
        ids.truncate(limit);
        let mut locked = Vec::with_capacity(ids.len());
        for id in ids.drain(..) {
            tables.embeddings_in_flight.insert(id);
            if let Some(claim) = tables.claims.get(&id) {
                locked.push(claim.clone());
            }
        }
        Ok(locked)
    }

    async fn update_embedding(
        &self,
        id: ClaimId,
        vector: Option<Vec<f32>>,
        status: EmbeddingStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let claim = tables
            .claims
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("claim {id}")))?;
        claim.embedding = vector;
        claim.embedding_status = status;
        claim.embedding_error = error;
        tables.embeddings_in_flight.remove(&id);
        Ok(())
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
        category: Option<Category>,
        min_evidence: Option<EvidenceLevel>,
    ) -> Result<Vec<SimilarClaim>, StoreError> {
        let tables = self.tables.read().await;
        let mut results: Vec<SimilarClaim> = tables
            .claims
            .values()
            .filter(|c| c.embedding.is_some())
            .filter(|c| category.map(|cat| cat == c.category).unwrap_or(true))
            .filter(|c| min_evidence.map(|min| c.evidence_level >= min).unwrap_or(true))
            .filter_map(|c| {
                let sim = cosine_similarity(embedding, c.embedding.as_ref().unwrap());
                if sim >= threshold {
                    Some(SimilarClaim {
                        id: c.id,
                        claim: c.clone(),
                        similarity: sim,
                        evidence_level: c.evidence_level,
                        study_design: c.study.study_design,
                        category: c.category,
                    })
                } else {
                    None
                }
            })
            .collect();
        results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        results.truncate(limit);
        Ok(results)
    }

    async fn add_relationship(&self, relationship: KnowledgeRelationship) -> Result<RelationshipId, StoreError> {
        let tables = self.tables.read().await;
        if !tables.claims.contains_key(&relationship.source_claim)
            || !tables.claims.contains_key(&relationship.target_claim)
        {
            return Err(StoreError::Constraint("relationship references unknown claim".into()));
        }
        drop(tables);
        let id = relationship.id;
        self.tables.write().await.relationships.insert(id, relationship);
        Ok(id)
    }

    async fn relationships_for(&self, claim_id: ClaimId) -> Result<Vec<KnowledgeRelationship>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .relationships
            .values()
            .filter(|r| r.source_claim == claim_id || r.target_claim == claim_id)
            .cloned()
            .collect())
    }

    async fn upsert_evidence(&self, entry: EvidenceHierarchy) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .evidence
            .insert((entry.topic.clone(), entry.category.to_string()), entry);
        Ok(())
    }

    async fn get_evidence(&self, topic: &str, category: Category) -> Result<Option<EvidenceHierarchy>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.evidence.get(&(topic.to_string(), category.to_string())).cloned())
    }

    async fn active_prompt(&self, category: Category) -> Result<Option<PromptVersion>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .prompts
            .values()
            .find(|p| p.category == category && p.is_active)
            .cloned())
    }

    async fn latest_prompt_version(&self, category: Category) -> Result<Option<PromptVersion>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .prompts
            .values()
            .filter(|p| p.category == category)
            .max_by_key(|p| p.version)
            .cloned())
    }

    async fn save_prompt_version(&self, version: PromptVersion) -> Result<PromptVersion, StoreError> {
        let mut tables = self.tables.write().await;
        tables.prompts.insert(version.id, version.clone());
        Ok(version)
    }

    async fn activate_prompt_version(&self, id: PromptVersionId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let category = tables
            .prompts
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("prompt version {id}")))?
            .category;
        for prompt in tables.prompts.values_mut() {
            if prompt.category == category {
                prompt.is_active = prompt.id == id;
            }
        }
        Ok(())
    }

    async fn list_trusted_authors(&self) -> Result<Vec<TrustedSource>, StoreError> {
        Ok(self.tables.read().await.trusted_authors.clone())
    }

    async fn list_trusted_journals(&self) -> Result<Vec<TrustedSource>, StoreError> {
        Ok(self.tables.read().await.trusted_journals.clone())
    }
}
