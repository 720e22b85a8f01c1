//! Text normalization helpers used by trusted-source matching and the
//! heuristic conflict detector.

use std::collections::HashSet;

/// Lowercase, strip punctuation, collapse whitespace. Used for both
/// registry keys and lookup queries so matching is case- and
/// punctuation-insensitive.
pub fn normalize_name(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Exact match on the normalized form, falling back to substring
/// containment in either direction (spec §4.2).
pub fn registry_boost(registry: &std::collections::HashMap<String, i32>, candidate: &str) -> i32 {
    let normalized = normalize_name(candidate);
    if normalized.is_empty() {
        return 0;
    }
    if let Some(boost) = registry.get(&normalized) {
        return *boost;
    }
    registry
        .iter()
        .filter(|(key, _)| key.contains(&normalized) || normalized.contains(key.as_str()))
        .map(|(_, boost)| *boost)
        .max()
        .unwrap_or(0)
}

/// Highest boost across a paper's author list, 0 if none trusted.
pub fn max_author_boost(registry: &std::collections::HashMap<String, i32>, authors: &[String]) -> i32 {
    authors.iter().map(|a| registry_boost(registry, a)).max().unwrap_or(0)
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "of", "in", "on", "to", "for", "and", "or",
    "with", "that", "this", "by", "at", "as", "be", "than", "beyond",
];

/// Lowercased, stopword-filtered token set for a claim's text.
pub fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

pub fn token_overlap(a: &str, b: &str) -> usize {
    let sa = token_set(a);
    let sb = token_set(b);
    sa.intersection(&sb).count()
}

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "none", "never", "without", "doesn't", "does not", "cannot", "can't", "fails to",
];

/// Whether the text contains a negation marker — used by the conflict
/// heuristic to detect asymmetric polarity between two similar claims.
pub fn contains_negation(text: &str) -> bool {
    let lower = text.to_lowercase();
    NEGATION_WORDS.iter().any(|w| lower.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn normalizes_punctuation_and_case() {
        assert_eq!(normalize_name("Dr. Jane   O'Brien"), "dr jane o brien");
    }

    #[test]
    fn registry_boost_exact_and_substring() {
        let mut reg = HashMap::new();
        reg.insert("journal of strength and conditioning research".to_string(), 2);
        assert_eq!(
            registry_boost(&reg, "Journal of Strength and Conditioning Research"),
            2
        );
        assert_eq!(
            registry_boost(&reg, "The Journal of Strength and Conditioning Research, Vol 3"),
            2
        );
        assert_eq!(registry_boost(&reg, "Unrelated Journal"), 0);
    }

    #[test]
    fn negation_asymmetry_detected() {
        let a = "High volume increases hypertrophy";
        let b = "High volume does not increase hypertrophy beyond moderate volume";
        assert!(!contains_negation(a));
        assert!(contains_negation(b));
        assert!(token_overlap(a, b) >= 3);
    }
}
