//! Chat-completions HTTP transport for the three text-reasoning
//! capabilities (`extract_claims`, `validate_claim`, `detect_conflict`).
//! Transport is HTTP with JSON; the implementation strips markdown
//! code fences before `serde_json` parsing and skips malformed items
//! individually rather than failing the whole call.

use serde::Deserialize;
use serde_json::json;

use super::{strip_markdown_fence, ConflictVerdict, ExtractedClaim, ValidationVerdict};
use crate::config::CircuitBreakerSettings;
use crate::error::{LlmError, RetryableError};
use crate::resilience::{retry_guarded, AdaptiveRateLimiter, CircuitBreaker, ResilienceHandles};
use crate::store::SimilarClaim;
use crate::types::{Category, EvidenceLevel, StudyDesign};

pub struct ChatLlm {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    limiter: AdaptiveRateLimiter,
    breaker: CircuitBreaker,
    resilience: ResilienceHandles,
}

impl ChatLlm {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        circuit_breaker: CircuitBreakerSettings,
        resilience: ResilienceHandles,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            limiter: AdaptiveRateLimiter::new(5.0, 5, 0.5, 20.0),
            breaker: CircuitBreaker::new(circuit_breaker.failure_threshold, circuit_breaker.reset_timeout),
            resilience,
        }
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, LlmError> {
        let client = &self.client;
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let api_key = &self.api_key;

        let result = retry_guarded(
            &self.resilience,
            "llm:chat",
            LlmError::is_retryable,
            || LlmError::Unavailable,
            || LlmError::Cancelled,
            || async {
                self.limiter.acquire().await;
                let result = self
                    .breaker
                    .call(|| async {
                        let response = client
                            .post(&url)
                            .bearer_auth(api_key)
                            .json(&body)
                            .send()
                            .await
                            .map_err(|e| LlmError::Transport(e.to_string()))?;
                        if !response.status().is_success() {
                            return Err(LlmError::Status(response.status().as_u16()));
                        }
                        let parsed: ChatCompletionResponse = response
                            .json()
                            .await
                            .map_err(|e| LlmError::Parse(e.to_string()))?;
                        parsed
                            .choices
                            .into_iter()
                            .next()
                            .map(|c| c.message.content)
                            .ok_or_else(|| LlmError::Parse("empty choices array".into()))
                    })
                    .await;

                match result {
                    Ok(text) => Ok(text),
                    Err(crate::resilience::circuit_breaker::CallError::Open(_)) => Err(LlmError::Unavailable),
                    Err(crate::resilience::circuit_breaker::CallError::Inner(e)) => Err(e),
                }
            },
        )
        .await;

        match &result {
            Ok(_) => self.limiter.on_success(),
            Err(LlmError::Status(429)) => self.limiter.on_rate_limited(),
            Err(_) => {}
        }
        result
    }

    pub async fn extract_claims(
        &self,
        title: &str,
        authors: &[String],
        abstract_text: &str,
    ) -> Result<Vec<ExtractedClaim>, LlmError> {
        if abstract_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let prompt = format!(
            "Title: {title}\nAuthors: {}\nAbstract: {abstract_text}\n\nExtract each distinct scientific claim as a JSON array.",
            authors.join(", ")
        );
        let raw = self
            .complete(
                "You extract structured exercise-science claims from paper abstracts. Respond with a JSON array only.",
                prompt,
            )
            .await?;
        let cleaned = strip_markdown_fence(&raw);
        let items: Vec<serde_json::Value> =
            serde_json::from_str(cleaned).map_err(|e| LlmError::Parse(e.to_string()))?;
        let claims = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<ExtractedClaim>(item).ok())
            .collect();
        Ok(claims)
    }

    pub async fn validate_claim(
        &self,
        claim_text: &str,
        category: Category,
        evidence_level: EvidenceLevel,
        study_design: Option<StudyDesign>,
        sample_size: Option<u32>,
        effect_size: Option<f64>,
        neighbors: &[SimilarClaim],
    ) -> Result<ValidationVerdict, LlmError> {
        let neighbor_text: Vec<String> = neighbors
            .iter()
            .map(|n| format!("- {} (similarity {:.2})", n.claim.claim_text, n.similarity))
            .collect();
        let prompt = format!(
            "Claim: {claim_text}\nCategory: {category}\nEvidence level: {evidence_level}\nStudy design: {study_design:?}\nSample size: {sample_size:?}\nEffect size: {effect_size:?}\nSimilar existing claims:\n{}\n\nRespond with JSON: {{\"is_valid\": bool, \"rejection_reasons\": [string], \"duplicate_of_index\": int|null, \"conflicts_with_indices\": [int]}}",
            neighbor_text.join("\n")
        );
        let raw = self
            .complete("You validate scientific claims for a knowledge base. Respond with JSON only.", prompt)
            .await?;
        let cleaned = strip_markdown_fence(&raw);
        serde_json::from_str(cleaned).map_err(|e| LlmError::Parse(e.to_string()))
    }

    pub async fn detect_conflict(&self, claim_a: &str, claim_b: &str) -> Result<ConflictVerdict, LlmError> {
        let prompt = format!(
            "Claim A: {claim_a}\nClaim B: {claim_b}\n\nDo these claims contradict each other? Respond with JSON: {{\"conflict_detected\": bool, \"relationship_type\": string, \"confidence\": float, \"explanation\": string}}"
        );
        let raw = self
            .complete("You detect contradictions between scientific claims. Respond with JSON only.", prompt)
            .await?;
        let cleaned = strip_markdown_fence(&raw);
        serde_json::from_str(cleaned).map_err(|e| LlmError::Parse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}
