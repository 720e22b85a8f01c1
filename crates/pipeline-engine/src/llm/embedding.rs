//! Embeddings HTTP transport. Fixed output dimension from config
//! (typically 1536, per the data model's embedding vector).

use serde::Deserialize;
use serde_json::json;

use crate::config::CircuitBreakerSettings;
use crate::error::{LlmError, RetryableError};
use crate::resilience::{circuit_breaker::CallError, retry_guarded, AdaptiveRateLimiter, CircuitBreaker, ResilienceHandles};

pub struct EmbeddingLlm {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    pub dimension: usize,
    limiter: AdaptiveRateLimiter,
    breaker: CircuitBreaker,
    resilience: ResilienceHandles,
}

impl EmbeddingLlm {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        dimension: usize,
        circuit_breaker: CircuitBreakerSettings,
        resilience: ResilienceHandles,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            dimension,
            limiter: AdaptiveRateLimiter::new(10.0, 10, 1.0, 40.0),
            breaker: CircuitBreaker::new(circuit_breaker.failure_threshold, circuit_breaker.reset_timeout),
            resilience,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let client = &self.client;
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": text });
        let api_key = &self.api_key;

        let result = retry_guarded(
            &self.resilience,
            "llm:embedding",
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
                        let parsed: EmbeddingResponse =
                            response.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;
                        parsed
                            .data
                            .into_iter()
                            .next()
                            .map(|d| d.embedding)
                            .ok_or_else(|| LlmError::Parse("empty embedding data array".into()))
                    })
                    .await;

                match result {
                    Ok(vector) => Ok(vector),
                    Err(CallError::Open(_)) => Err(LlmError::Unavailable),
                    Err(CallError::Inner(e)) => Err(e),
                }
            },
        )
        .await;

        match &result {
            Ok(_) => self.limiter.on_success(),
            Err(LlmError::Status(429)) => self.limiter.on_rate_limited(),
            Err(_) => {}
        }

        match result {
            Ok(vector) if vector.len() == self.dimension => Ok(vector),
            Ok(vector) => Err(LlmError::Parse(format!(
                "embedding dimension {} does not match configured {}",
                vector.len(),
                self.dimension
            ))),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}
