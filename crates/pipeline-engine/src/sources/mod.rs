//! Source adapters (§6 "Source adapters"): one `fetch` per external
//! collaborator, each composing a `reqwest::Client`, a
//! [`crate::resilience::rate_limiter::TokenBucket`] and a
//! [`crate::resilience::CircuitBreaker`]. Grounded file-for-file on the
//! original prototype's `services/*.py` modules (see
//! `SPEC_FULL.md` §4.2 for the mapping).

pub mod crossref;
pub mod feeds;
pub mod perplexity;
pub mod pubmed;
pub mod scraper;

use chrono::{DateTime, Utc};

use crate::types::SourceType;

/// How far back a source should look, shared by every adapter so the
/// Research agent doesn't have to know each adapter's native window
/// representation (days vs. a cursor vs. a feed's own retention).
#[derive(Debug, Clone, Copy)]
pub struct LookbackWindow {
    pub days: i64,
    pub max_results: usize,
}

/// A single harvested candidate, normalized to the shape the Research
/// agent's dedup/quality-filter/priority pipeline expects. Adapter-
/// specific fields (PMID, MeSH terms, citation counts, ...) travel in
/// `raw_data` exactly as they will be persisted on the queue item.
#[derive(Debug, Clone)]
pub struct CandidatePaper {
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub journal: Option<String>,
    pub study_design_hint: Option<crate::types::StudyDesign>,
    pub source_type: SourceType,
    pub raw_data: serde_json::Value,
}
