//! LLM-backed search adapter: Perplexity's chat-completions endpoint,
//! with citations returned alongside the generated text treated as
//! candidate URLs. Grounded on the original prototype's
//! `perplexity_service.py` (`SEARCH_QUERIES` list, URL dedup across
//! queries).

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::{CandidatePaper, LookbackWindow};
use crate::config::CircuitBreakerSettings;
use crate::error::{RetryableError, SourceError};
use crate::resilience::{retry_guarded, AdaptiveRateLimiter, CircuitBreaker, ResilienceHandles};
use crate::types::SourceType;

const BASE_URL: &str = "https://api.perplexity.ai/chat/completions";

/// Default topical sweep, mirroring the original's `SEARCH_QUERIES`.
const SEARCH_QUERIES: &[&str] = &[
    "latest research on resistance training and muscle hypertrophy",
    "recent studies on protein intake for muscle growth",
    "new findings on training volume and strength adaptations",
    "emerging research on recovery and overtraining",
    "recent meta-analyses on periodization for strength athletes",
    "latest evidence on creatine supplementation",
    "recent research on sleep and athletic performance",
    "new studies on exercise and injury prevention",
];

pub struct PerplexitySource {
    client: reqwest::Client,
    api_key: String,
    model: String,
    limiter: AdaptiveRateLimiter,
    breaker: CircuitBreaker,
    resilience: ResilienceHandles,
}

impl PerplexitySource {
    pub fn new(
        api_key: String,
        rate_limit: f64,
        circuit_breaker: CircuitBreakerSettings,
        resilience: ResilienceHandles,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: "llama-3.1-sonar-small-128k-online".to_string(),
            limiter: AdaptiveRateLimiter::from_base_rate(rate_limit),
            breaker: CircuitBreaker::new(circuit_breaker.failure_threshold, circuit_breaker.reset_timeout),
            resilience,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub async fn fetch(&self, window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        if !self.is_configured() {
            return Ok(Vec::new());
        }
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut papers = Vec::new();
        for query in SEARCH_QUERIES {
            match self.search_query(query, window).await {
                Ok(results) => {
                    for paper in results {
                        if let Some(url) = &paper.url {
                            if !seen_urls.insert(url.clone()) {
                                continue;
                            }
                        }
                        papers.push(paper);
                    }
                }
                Err(e) => tracing::warn!(query, error = %e, "perplexity search failed"),
            }
        }
        papers.truncate(window.max_results.max(1) * SEARCH_QUERIES.len());
        Ok(papers)
    }

    /// Runs a single query against the chat-completions endpoint and
    /// turns each returned citation URL into a candidate paper; the
    /// model's prose summary becomes the abstract text since Perplexity
    /// does not expose per-citation abstracts.
    pub async fn search_query(&self, query: &str, window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        let api_key = self.api_key.clone();
        let model = self.model.clone();
        let query = query.to_string();

        let result = retry_guarded(
            &self.resilience,
            "perplexity:search",
            SourceError::is_retryable,
            || SourceError::Transport("retry budget exhausted".into()),
            || SourceError::Cancelled,
            || async {
                self.limiter.acquire().await;
                let result = self
                    .breaker
                    .call(|| async {
                        let body = json!({
                            "model": model,
                            "messages": [
                                {"role": "system", "content": "You are a research assistant. Summarize recent peer-reviewed findings and cite sources."},
                                {"role": "user", "content": query},
                            ],
                        });
                        let response = self
                            .client
                            .post(BASE_URL)
                            .bearer_auth(&api_key)
                            .json(&body)
                            .timeout(Duration::from_secs(30))
                            .send()
                            .await
                            .map_err(|e| SourceError::Transport(e.to_string()))?;
                        if !response.status().is_success() {
                            return Err(SourceError::Status(response.status().as_u16()));
                        }
                        let parsed: PerplexityResponse =
                            response.json().await.map_err(|e| SourceError::Parse(e.to_string()))?;
                        Ok(parsed)
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
        let parsed = result?;

        let summary = parsed.choices.into_iter().next().map(|c| c.message.content).unwrap_or_default();
        let papers = parsed
            .citations
            .into_iter()
            .take(window.max_results)
            .map(|url| CandidatePaper {
                title: title_from_url(&url),
                authors: Vec::new(),
                abstract_text: if summary.is_empty() { None } else { Some(summary.clone()) },
                doi: None,
                url: Some(url),
                publication_date: None,
                journal: None,
                study_design_hint: None,
                source_type: SourceType::Perplexity,
                raw_data: serde_json::json!({ "query": query }),
            })
            .collect();
        Ok(papers)
    }
}

fn title_from_url(url: &str) -> String {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url).replace(['-', '_'], " ")
}

#[derive(Debug, Deserialize)]
struct PerplexityResponse {
    choices: Vec<PerplexityChoice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PerplexityChoice {
    message: PerplexityMessage,
}

#[derive(Debug, Deserialize)]
struct PerplexityMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{DeadLetterQueue, RetryBudget, RetryPolicy};
    use std::sync::Arc;

    fn test_circuit_breaker() -> CircuitBreakerSettings {
        CircuitBreakerSettings { failure_threshold: 5, reset_timeout: Duration::from_secs(60) }
    }

    fn test_resilience() -> ResilienceHandles {
        ResilienceHandles::new(
            RetryPolicy::default(),
            Arc::new(RetryBudget::new(100, 100.0)),
            Arc::new(DeadLetterQueue::new(10)),
            tokio_util::sync::CancellationToken::new(),
        )
    }

    #[test]
    fn unconfigured_without_api_key() {
        let source = PerplexitySource::new(String::new(), 1.0, test_circuit_breaker(), test_resilience());
        assert!(!source.is_configured());
    }

    #[test]
    fn configured_with_api_key() {
        let source = PerplexitySource::new("key".into(), 1.0, test_circuit_breaker(), test_resilience());
        assert!(source.is_configured());
    }

    #[test]
    fn title_from_url_replaces_separators() {
        assert_eq!(title_from_url("https://example.com/high-volume-training"), "high volume training");
    }
}
