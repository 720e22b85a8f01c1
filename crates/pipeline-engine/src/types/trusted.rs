//! [TrustedSource] — the `trusted_authors` and `trusted_journals` registries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A normalized registry entry: name → priority boost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedSource {
    pub normalized_name: String,
    pub priority_boost: i32,
}

/// The two sibling registries, read-only from the agent engine's
/// perspective, keyed by normalized name for O(1) exact lookup with a
/// substring-containment fallback (see [`crate::util::text::normalize_name`]).
#[derive(Debug, Clone, Default)]
pub struct TrustedRegistries {
    pub authors: HashMap<String, i32>,
    pub journals: HashMap<String, i32>,
}

impl TrustedRegistries {
    pub fn from_sources(authors: Vec<TrustedSource>, journals: Vec<TrustedSource>) -> Self {
        Self {
            authors: authors
                .into_iter()
                .map(|s| (s.normalized_name, s.priority_boost))
                .collect(),
            journals: journals
                .into_iter()
                .map(|s| (s.normalized_name, s.priority_boost))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty() && self.journals.is_empty()
    }
}
