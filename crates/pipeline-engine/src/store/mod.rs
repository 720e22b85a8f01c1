//! The persistence contract (§6) consumed by every agent. Only the
//! operations, their semantics, and returned shapes are specified here;
//! the concrete backend (relational + vector extension, embedded KV+ANN,
//! or otherwise) is deliberately out of scope (spec §1).

pub mod mock;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::*;

/// A claim patch: only present fields are applied. Used by
/// `Store::update_claim` so agents don't have to round-trip a full claim
/// to flip a handful of fields.
#[derive(Debug, Clone, Default)]
pub struct ClaimPatch {
    pub status: Option<ClaimStatus>,
    pub conflicting_evidence: Option<bool>,
    pub auto_validated: Option<bool>,
    pub duplicate_of: Option<ClaimId>,
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SimilarClaim {
    pub id: ClaimId,
    pub claim: ScientificClaim,
    pub similarity: f64,
    pub evidence_level: EvidenceLevel,
    pub study_design: Option<StudyDesign>,
    pub category: Category,
}

/// The narrow store interface every agent depends on. Implementors must
/// guarantee:
/// - `embedding_status = Pending` as the default on claim insert —
///   `insert_draft` overwrites whatever `embedding_status` the caller set
///   on the passed claim, it is not merely a convention callers uphold.
/// - the single-active-prompt invariant inside `activate_prompt_version`.
/// - `claim_pending` and `lock_pending_embeddings` are atomic
///   (status-flip-and-return), never emulated as read-then-write in the
///   calling agent (spec §9 Open Question #3).
#[async_trait]
pub trait Store: Send + Sync {
    // Research queue
    async fn enqueue_candidate(&self, item: ResearchQueueItem) -> Result<QueueItemId, StoreError>;
    async fn find_queue_item_by_identity(
        &self,
        doi: Option<&str>,
        url: Option<&str>,
    ) -> Result<Option<ResearchQueueItem>, StoreError>;
    /// Atomically claims up to `limit` `Pending` items (ordered by
    /// priority ascending, then creation time ascending) by flipping
    /// their status to `Processing` and returning only the flipped rows.
    async fn claim_pending(&self, limit: usize) -> Result<Vec<ResearchQueueItem>, StoreError>;
    async fn set_queue_status(
        &self,
        id: QueueItemId,
        status: QueueStatus,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    // Claims
    async fn insert_draft(&self, claim: ScientificClaim) -> Result<ClaimId, StoreError>;
    async fn get_claim(&self, id: ClaimId) -> Result<ScientificClaim, StoreError>;
    async fn update_claim(&self, id: ClaimId, patch: ClaimPatch) -> Result<(), StoreError>;
    async fn list_draft_claims(&self, limit: usize) -> Result<Vec<ScientificClaim>, StoreError>;
    async fn list_by_category_filtered(
        &self,
        category: Category,
        min_evidence: EvidenceLevel,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<ScientificClaim>, StoreError>;
    async fn list_all_active(&self, limit: usize) -> Result<Vec<ScientificClaim>, StoreError>;
    /// Atomically locks up to `limit` claims with `embedding_status =
    /// Pending` for this worker and returns them.
    async fn lock_pending_embeddings(&self, limit: usize) -> Result<Vec<ScientificClaim>, StoreError>;
    async fn update_embedding(
        &self,
        id: ClaimId,
        vector: Option<Vec<f32>>,
        status: EmbeddingStatus,
        error: Option<String>,
    ) -> Result<(), StoreError>;
    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
        category: Option<Category>,
        min_evidence: Option<EvidenceLevel>,
    ) -> Result<Vec<SimilarClaim>, StoreError>;

    // Relationships
    async fn add_relationship(
        &self,
        relationship: KnowledgeRelationship,
    ) -> Result<RelationshipId, StoreError>;
    async fn relationships_for(&self, claim_id: ClaimId) -> Result<Vec<KnowledgeRelationship>, StoreError>;

    // Evidence hierarchy
    async fn upsert_evidence(&self, entry: EvidenceHierarchy) -> Result<(), StoreError>;
    async fn get_evidence(&self, topic: &str, category: Category) -> Result<Option<EvidenceHierarchy>, StoreError>;

    // Prompts
    async fn active_prompt(&self, category: Category) -> Result<Option<PromptVersion>, StoreError>;
    async fn latest_prompt_version(&self, category: Category) -> Result<Option<PromptVersion>, StoreError>;
    async fn save_prompt_version(&self, version: PromptVersion) -> Result<PromptVersion, StoreError>;
    /// Atomic swap: clears the prior active version for the category (if
    /// any) and marks `id` active.
    async fn activate_prompt_version(&self, id: PromptVersionId) -> Result<(), StoreError>;

    // Trusted sources
    async fn list_trusted_authors(&self) -> Result<Vec<TrustedSource>, StoreError>;
    async fn list_trusted_journals(&self) -> Result<Vec<TrustedSource>, StoreError>;
}
