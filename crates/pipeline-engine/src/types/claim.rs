//! [ScientificClaim] — a single distilled assertion, and its study metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ClaimId;
use super::research::InvalidTransition;

/// Closed enumeration of knowledge domains a claim or prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Hypertrophy,
    Strength,
    Endurance,
    Nutrition,
    Recovery,
    InjuryPrevention,
    Technique,
    Programming,
    Supplements,
    General,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Hypertrophy,
        Category::Strength,
        Category::Endurance,
        Category::Nutrition,
        Category::Recovery,
        Category::InjuryPrevention,
        Category::Technique,
        Category::Programming,
        Category::Supplements,
        Category::General,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Hypertrophy => "hypertrophy",
            Category::Strength => "strength",
            Category::Endurance => "endurance",
            Category::Nutrition => "nutrition",
            Category::Recovery => "recovery",
            Category::InjuryPrevention => "injury_prevention",
            Category::Technique => "technique",
            Category::Programming => "programming",
            Category::Supplements => "supplements",
            Category::General => "general",
        };
        write!(f, "{s}")
    }
}

/// 1 (expert opinion) .. 5 (meta-analysis).
pub type EvidenceLevel = u8;
pub const EVIDENCE_MIN: EvidenceLevel = 1;
pub const EVIDENCE_MAX: EvidenceLevel = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyDesign {
    MetaAnalysis,
    SystematicReview,
    Rct,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Active,
    Deprecated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub sample_size: Option<u32>,
    pub study_design: Option<StudyDesign>,
    pub population: Option<String>,
    pub effect_size: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub source_doi: Option<String>,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    pub source_authors: Vec<String>,
    pub publication_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScientificClaim {
    pub id: ClaimId,
    pub claim_text: String,
    pub summary: String,
    pub category: Category,
    pub evidence_level: EvidenceLevel,
    pub confidence_score: f64,
    pub status: ClaimStatus,
    pub provenance: Provenance,
    pub study: StudyMetadata,
    pub key_findings: Vec<String>,
    pub limitations: Option<String>,
    pub conflicting_evidence: bool,
    pub embedding_status: EmbeddingStatus,
    pub embedding: Option<Vec<f32>>,
    pub embedding_error: Option<String>,
    pub auto_validated: bool,
    pub duplicate_of: Option<ClaimId>,
    pub created_at: DateTime<Utc>,
}

impl ScientificClaim {
    /// `Draft` → `Active` (Validation accept / auto-approve) or
    /// `Deprecated` (Validation reject). `Active` may only re-enter
    /// itself (re-running Validation on an already-decided claim is a
    /// no-op, never a regression to `Draft`).
    pub fn transition(&mut self, next: ClaimStatus) -> Result<(), InvalidTransition> {
        let allowed = matches!(
            (self.status, next),
            (ClaimStatus::Draft, ClaimStatus::Active)
                | (ClaimStatus::Draft, ClaimStatus::Deprecated)
                | (ClaimStatus::Active, ClaimStatus::Active)
        );
        if !allowed {
            return Err(InvalidTransition {
                from: format!("{:?}", self.status),
                to: format!("{:?}", next),
            });
        }
        self.status = next;
        Ok(())
    }

    /// `Pending` (at creation) → `Completed` (KB success) or `Failed`
    /// (KB error, with stored text). `Failed` is re-runnable via
    /// `RebuildEmbeddings`, which re-enters `Pending` first.
    pub fn transition_embedding(&mut self, next: EmbeddingStatus) -> Result<(), InvalidTransition> {
        let allowed = matches!(
            (self.embedding_status, next),
            (EmbeddingStatus::Pending, EmbeddingStatus::Completed)
                | (EmbeddingStatus::Pending, EmbeddingStatus::Failed)
                | (EmbeddingStatus::Failed, EmbeddingStatus::Pending)
                | (EmbeddingStatus::Completed, EmbeddingStatus::Pending)
        );
        if !allowed {
            return Err(InvalidTransition {
                from: format!("{:?}", self.embedding_status),
                to: format!("{:?}", next),
            });
        }
        self.embedding_status = next;
        Ok(())
    }
}
