//! DOI registry adapter: the public CrossRef `works` REST API. CrossRef
//! asks polite-pool users to identify themselves via a contact email in
//! the `User-Agent`; absent one, requests land in the general pool and
//! are more aggressively throttled upstream.

use std::time::Duration;

use super::{CandidatePaper, LookbackWindow};
use crate::config::CircuitBreakerSettings;
use crate::error::{RetryableError, SourceError};
use crate::resilience::{retry_guarded, AdaptiveRateLimiter, CircuitBreaker, ResilienceHandles};
use crate::types::{SourceType, StudyDesign};
use crate::util::date::date_from_parts;

const BASE_URL: &str = "https://api.crossref.org/works";

pub struct CrossrefSource {
    client: reqwest::Client,
    limiter: AdaptiveRateLimiter,
    breaker: CircuitBreaker,
    resilience: ResilienceHandles,
}

impl CrossrefSource {
    pub fn new(
        contact_email: Option<&str>,
        rate_limit: f64,
        circuit_breaker: CircuitBreakerSettings,
        resilience: ResilienceHandles,
    ) -> Self {
        let user_agent = match contact_email {
            Some(email) => format!("evidence-pipeline/1.0 (mailto:{email})"),
            None => "evidence-pipeline/1.0".to_string(),
        };
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .unwrap_or_default();
        Self {
            client,
            limiter: AdaptiveRateLimiter::from_base_rate(rate_limit),
            breaker: CircuitBreaker::new(circuit_breaker.failure_threshold, circuit_breaker.reset_timeout),
            resilience,
        }
    }

    pub async fn fetch(&self, window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        self.search_query("resistance training OR muscle hypertrophy OR exercise physiology", window).await
    }

    pub async fn search_query(&self, query: &str, window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        let from = (chrono::Utc::now() - chrono::Duration::days(window.days)).format("%Y-%m-%d").to_string();
        let params = [
            ("query", query.to_string()),
            ("filter", format!("from-pub-date:{from}")),
            ("rows", window.max_results.to_string()),
            ("sort", "published".to_string()),
            ("order", "desc".to_string()),
        ];

        let result = retry_guarded(
            &self.resilience,
            "crossref:search",
            SourceError::is_retryable,
            || SourceError::Transport("retry budget exhausted".into()),
            || SourceError::Cancelled,
            || async {
                self.limiter.acquire().await;
                let result = self
                    .breaker
                    .call(|| async {
                        let response = self
                            .client
                            .get(BASE_URL)
                            .query(&params)
                            .timeout(Duration::from_secs(30))
                            .send()
                            .await
                            .map_err(|e| SourceError::Transport(e.to_string()))?;
                        if !response.status().is_success() {
                            return Err(SourceError::Status(response.status().as_u16()));
                        }
                        let body: serde_json::Value =
                            response.json().await.map_err(|e| SourceError::Parse(e.to_string()))?;
                        Ok(parse_crossref_items(&body))
                    })
                    .await;

                match result {
                    Ok(v) => Ok(v),
                    Err(crate::resilience::circuit_breaker::CallError::Open(_)) => {
                        Err(SourceError::Transport("circuit breaker open".into()))
                    }
                    Err(crate::resilience::circuit_breaker::CallError::Inner(e)) => Err(e),
                }
            },
        )
        .await;

        match &result {
            Ok(_) => self.limiter.on_success(),
            Err(SourceError::Status(429)) => self.limiter.on_rate_limited(),
            Err(_) => {}
        }
        result
    }
}

fn study_design_from_crossref_type(type_: &str) -> Option<StudyDesign> {
    match type_ {
        "journal-article" => None,
        _ => Some(StudyDesign::Other),
    }
}

fn parse_crossref_items(body: &serde_json::Value) -> Vec<CandidatePaper> {
    let now = chrono::Utc::now();
    let items = match body["message"]["items"].as_array() {
        Some(items) => items,
        None => return Vec::new(),
    };

    let mut papers = Vec::new();
    for item in items {
        let title = item["title"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if title.is_empty() {
            continue;
        }

        let doi = item["DOI"].as_str().map(str::to_string);
        let journal = item["container-title"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let authors = item["author"]
            .as_array()
            .map(|authors| {
                authors
                    .iter()
                    .filter_map(|a| {
                        let given = a["given"].as_str().unwrap_or_default();
                        let family = a["family"].as_str().unwrap_or_default();
                        if family.is_empty() {
                            None
                        } else if given.is_empty() {
                            Some(family.to_string())
                        } else {
                            Some(format!("{given} {family}"))
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let date_parts: Vec<i32> = item["published"]["date-parts"]
            .as_array()
            .and_then(|outer| outer.first())
            .and_then(|inner| inner.as_array())
            .map(|parts| parts.iter().filter_map(|v| v.as_i64()).map(|n| n as i32).collect())
            .unwrap_or_default();
        let publication_date = date_from_parts(&date_parts, now);

        let citation_count = item["is-referenced-by-count"].as_u64().unwrap_or(0);
        let type_ = item["type"].as_str().unwrap_or_default();

        papers.push(CandidatePaper {
            title,
            authors,
            abstract_text: item["abstract"].as_str().map(str::to_string),
            doi: doi.clone(),
            url: doi.as_ref().map(|d| format!("https://doi.org/{d}")),
            publication_date,
            journal,
            study_design_hint: study_design_from_crossref_type(type_),
            source_type: SourceType::Crossref,
            raw_data: serde_json::json!({ "citation_count": citation_count, "type": type_ }),
        });
    }
    papers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_item() {
        let body = serde_json::json!({
            "message": {
                "items": [{
                    "title": ["Effects of periodization on strength"],
                    "DOI": "10.1000/xyz",
                    "container-title": ["Sports Medicine"],
                    "author": [{"given": "Jane", "family": "Doe"}],
                    "published": {"date-parts": [[2023, 6]]},
                    "is-referenced-by-count": 12,
                    "type": "journal-article"
                }]
            }
        });
        let papers = parse_crossref_items(&body);
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].authors, vec!["Jane Doe".to_string()]);
        assert_eq!(papers[0].raw_data["citation_count"], 12);
        assert!(papers[0].study_design_hint.is_none());
    }

    #[test]
    fn skips_items_with_no_title() {
        let body = serde_json::json!({ "message": { "items": [{"DOI": "10.1/x"}] } });
        assert!(parse_crossref_items(&body).is_empty());
    }
}
