//! [ResearchQueueItem] — a candidate paper pending distillation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::QueueItemId;

/// Where a candidate paper was harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Pubmed,
    Crossref,
    RssFeed,
    WebScrape,
    Perplexity,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceType::Pubmed => "pubmed",
            SourceType::Crossref => "crossref",
            SourceType::RssFeed => "rss_feed",
            SourceType::WebScrape => "web_scrape",
            SourceType::Perplexity => "perplexity",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of a queue item: `Pending` → `Processing`
/// (Extraction claims the item) → `Completed` or `Failed`.
///
/// `Completed` means "drafts were emitted by Extraction", not "fully
/// validated" — Validation may still reject every draft the item
/// produced. Keeping those meanings distinct avoids semantic drift
/// between queue-item status and claim status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    /// `Completed` and `Failed` are terminal; no further transition is valid.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// A candidate paper awaiting distillation into structured claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchQueueItem {
    pub id: QueueItemId,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub source_type: SourceType,
    pub status: QueueStatus,
    /// 1 (highest) .. 10 (lowest), clamped.
    pub priority: u8,
    /// Source-specific fields and the trusted-source boosts applied at
    /// enqueue time, e.g. `{"author_boost": 2, "journal_boost": 1}`.
    pub raw_data: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ResearchQueueItem {
    /// Attempt a status transition, rejecting any move out of a terminal
    /// state or any move that isn't forward.
    pub fn transition(&mut self, next: QueueStatus) -> Result<(), InvalidTransition> {
        let allowed = matches!(
            (self.status, next),
            (QueueStatus::Pending, QueueStatus::Processing)
                | (QueueStatus::Processing, QueueStatus::Completed)
                | (QueueStatus::Processing, QueueStatus::Failed)
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
}

#[derive(Debug, thiserror::Error)]
#[error("invalid state transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 10;

/// Clamp a signed priority accumulator to the [1,10] bounds. All boosts
/// (design, author, journal, recency) are summed first and clamped
/// exactly once at the end, so an overshoot on one axis can't silently
/// cancel a deficit on another before clamping.
pub fn clamp_priority(raw: i32) -> u8 {
    raw.clamp(PRIORITY_MIN as i32, PRIORITY_MAX as i32) as u8
}
