//! [EvidenceHierarchy] — a per-(topic, category) evidence-density accumulator.

use serde::{Deserialize, Serialize};

use super::claim::Category;

/// `topic` and `category` are kept as distinct fields even though today
/// every writer sets `topic == category.to_string()` — this leaves room
/// for finer topic granularity (e.g. per-exercise rather than
/// per-category) without a schema change later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceHierarchy {
    pub topic: String,
    pub category: Category,
    pub total_score: f64,
}
