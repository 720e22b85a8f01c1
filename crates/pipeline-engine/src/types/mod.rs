//! Core data model for the evidence-curation pipeline.
//!
//! Six entities carry all pipeline state: [`research::ResearchQueueItem`],
//! [`claim::ScientificClaim`], [`relationship::KnowledgeRelationship`],
//! [`evidence::EvidenceHierarchy`], [`prompt::PromptVersion`] and
//! [`trusted::TrustedSource`]. Dynamic attachments (`raw_data`,
//! `knowledge_snapshot`, `metadata`) are carried as `serde_json::Value`
//! so forward-compatible source fields survive a round trip without a
//! schema migration.

pub mod claim;
pub mod evidence;
pub mod ids;
pub mod prompt;
pub mod relationship;
pub mod research;
pub mod trusted;

pub use claim::*;
pub use evidence::*;
pub use ids::*;
pub use prompt::*;
pub use relationship::*;
pub use research::*;
pub use trusted::*;
