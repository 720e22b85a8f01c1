//! [KnowledgeRelationship] — a directed, typed edge between two claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ClaimId, RelationshipId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Contradicts,
    Supports,
    Related,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRelationship {
    pub id: RelationshipId,
    pub source_claim: ClaimId,
    pub target_claim: ClaimId,
    pub relationship_type: RelationshipType,
    /// [0,1]
    pub confidence: f64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RelationshipError {
    #[error("relationship endpoints must reference distinct claims")]
    SelfReference,
}

impl KnowledgeRelationship {
    pub fn new(
        source_claim: ClaimId,
        target_claim: ClaimId,
        relationship_type: RelationshipType,
        confidence: f64,
        note: Option<String>,
    ) -> Result<Self, RelationshipError> {
        if source_claim == target_claim {
            return Err(RelationshipError::SelfReference);
        }
        Ok(Self {
            id: RelationshipId::new(),
            source_claim,
            target_claim,
            relationship_type,
            confidence: confidence.clamp(0.0, 1.0),
            note,
            created_at: Utc::now(),
        })
    }
}
