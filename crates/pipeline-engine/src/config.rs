//! Typed, environment-variable-driven configuration, validated eagerly at
//! startup (§6 Control Surface). `ENVIRONMENT` selects a preset
//! (`development`, `production`, `testing`) supplying defaults for batch
//! sizes, intervals, and log level before the remaining env vars are
//! read and override those defaults.
//!
//! Grounded on the original prototype's `config/settings.py` field list
//! and validators, adapted from a `.env`-loaded Pydantic model to plain
//! `std::env::var` reads with the same validation rules.

use std::time::Duration;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Testing,
}

impl std::str::FromStr for Environment {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "testing" | "test" => Ok(Environment::Testing),
            other => Err(PipelineError::Config(format!("unknown ENVIRONMENT \"{other}\""))),
        }
    }
}

/// Per-agent period and batch size, held separately per agent rather
/// than as one struct per agent config to keep `Engine::start` iterating
/// over a flat `[(AgentName, Duration, usize)]` rather than six
/// differently-shaped configs.
#[derive(Debug, Clone)]
pub struct AgentSchedule {
    pub interval: Duration,
    pub batch_size: usize,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ResearchConfig {
    pub schedule: AgentSchedule,
    pub lookback_days: i64,
    pub max_results_per_source: usize,
    pub enable_web_scraping: bool,
    pub enable_perplexity: bool,
    pub enable_trusted_source_search: bool,
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub schedule: AgentSchedule,
    pub min_evidence_level: u8,
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct ConflictConfig {
    pub schedule: AgentSchedule,
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub max_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimits {
    pub pubmed: f64,
    pub crossref: f64,
    pub rss: f64,
    pub llm: f64,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub webhook_urls: Vec<String>,
    pub min_severity: crate::alerting::AlertSeverity,
    pub error_rate_threshold: f64,
    pub dedup_window: Duration,
}

/// An immutable configuration snapshot shared by every agent and the
/// Engine. Built once at startup; agents never mutate it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub environment: Environment,
    pub research: ResearchConfig,
    pub extraction: AgentSchedule,
    pub validation: ValidationConfig,
    pub knowledge_base: AgentSchedule,
    pub conflict: ConflictConfig,
    pub prompt_engineering: AgentSchedule,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub rate_limits: RateLimits,
    pub llm: LlmSettings,
    pub alerts: AlertSettings,
    pub health_check_interval: Duration,
    pub shutdown_timeout: Duration,
    pub log_level: String,
    pub contact_email: String,
    pub perplexity_api_key: Option<String>,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> Result<u64, PipelineError> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| PipelineError::Config(format!("{key} must be a positive integer, got \"{raw}\""))),
    }
}

fn env_f64(key: &str, default: f64) -> Result<f64, PipelineError> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| PipelineError::Config(format!("{key} must be a number, got \"{raw}\""))),
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_var(key) {
        None => default,
        Some(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
    }
}

fn validate_positive(key: &str, value: u64) -> Result<(), PipelineError> {
    if value == 0 {
        return Err(PipelineError::Config(format!("{key} must be strictly positive")));
    }
    Ok(())
}

fn validate_positive_f64(key: &str, value: f64) -> Result<(), PipelineError> {
    if value <= 0.0 {
        return Err(PipelineError::Config(format!("{key} must be strictly positive")));
    }
    Ok(())
}

fn validate_url(key: &str, value: &str) -> Result<(), PipelineError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(PipelineError::Config(format!("{key} must start with http:// or https://, got \"{value}\"")));
    }
    Ok(())
}

impl PipelineConfig {
    /// Load from the environment, applying an `ENVIRONMENT`-selected
    /// preset before individual env var overrides, then validate every
    /// field eagerly so a misconfiguration fails at startup rather than
    /// on the first agent tick.
    pub fn from_env() -> Result<Self, PipelineError> {
        let environment: Environment = env_var("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string())
            .parse()?;

        let (research_interval, extraction_interval, validation_interval, kb_interval, conflict_interval, prompt_interval, log_level) =
            match environment {
                Environment::Development => (3600, 300, 300, 120, 900, 3600, "DEBUG"),
                Environment::Testing => (60, 5, 5, 5, 30, 60, "DEBUG"),
                Environment::Production => (86400, 1800, 900, 600, 3600, 86400, "INFO"),
            };

        let llm_base_url = env_var("LLM_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        validate_url("LLM_BASE_URL", &llm_base_url)?;

        let webhook_urls: Vec<String> = [env_var("ALERT_WEBHOOK_URL_1"), env_var("ALERT_WEBHOOK_URL_2")]
            .into_iter()
            .flatten()
            .collect();
        for url in &webhook_urls {
            validate_url("ALERT_WEBHOOK_URL", url)?;
        }

        let log_level = env_var("LOG_LEVEL").unwrap_or_else(|| log_level.to_string());
        let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];
        if !valid_levels.contains(&log_level.to_uppercase().as_str()) {
            return Err(PipelineError::Config(format!(
                "LOG_LEVEL must be one of {valid_levels:?}, got \"{log_level}\""
            )));
        }

        let research_interval = env_u64("RESEARCH_INTERVAL_SECONDS", research_interval)?;
        let extraction_interval = env_u64("EXTRACTION_INTERVAL_SECONDS", extraction_interval)?;
        let validation_interval = env_u64("VALIDATION_INTERVAL_SECONDS", validation_interval)?;
        let kb_interval = env_u64("KB_INTERVAL_SECONDS", kb_interval)?;
        let conflict_interval = env_u64("CONFLICT_INTERVAL_SECONDS", conflict_interval)?;
        let prompt_interval = env_u64("PROMPT_ENGINEERING_INTERVAL_SECONDS", prompt_interval)?;
        for (key, value) in [
            ("RESEARCH_INTERVAL_SECONDS", research_interval),
            ("EXTRACTION_INTERVAL_SECONDS", extraction_interval),
            ("VALIDATION_INTERVAL_SECONDS", validation_interval),
            ("KB_INTERVAL_SECONDS", kb_interval),
            ("CONFLICT_INTERVAL_SECONDS", conflict_interval),
            ("PROMPT_ENGINEERING_INTERVAL_SECONDS", prompt_interval),
        ] {
            validate_positive(key, value)?;
        }

        let pubmed_rate = env_f64("PUBMED_RATE_LIMIT", 3.0)?;
        let crossref_rate = env_f64("CROSSREF_RATE_LIMIT", 10.0)?;
        let rss_rate = env_f64("RSS_RATE_LIMIT", 2.0)?;
        let llm_rate = env_f64("LLM_RATE_LIMIT", 5.0)?;
        for (key, value) in [
            ("PUBMED_RATE_LIMIT", pubmed_rate),
            ("CROSSREF_RATE_LIMIT", crossref_rate),
            ("RSS_RATE_LIMIT", rss_rate),
            ("LLM_RATE_LIMIT", llm_rate),
        ] {
            validate_positive_f64(key, value)?;
        }

        Ok(Self {
            environment,
            research: ResearchConfig {
                schedule: AgentSchedule {
                    interval: Duration::from_secs(research_interval),
                    batch_size: env_u64("RESEARCH_BATCH_SIZE", 20)? as usize,
                    enabled: env_bool("RESEARCH_ENABLED", true),
                },
                lookback_days: env_u64("RESEARCH_LOOKBACK_DAYS", 7)? as i64,
                max_results_per_source: env_u64("RESEARCH_MAX_RESULTS_PER_SOURCE", 20)? as usize,
                enable_web_scraping: env_bool("RESEARCH_ENABLE_WEB_SCRAPING", false),
                enable_perplexity: env_bool("RESEARCH_ENABLE_PERPLEXITY", true),
                enable_trusted_source_search: env_bool("RESEARCH_ENABLE_TRUSTED_SOURCE_SEARCH", true),
            },
            extraction: AgentSchedule {
                interval: Duration::from_secs(extraction_interval),
                batch_size: env_u64("EXTRACTION_BATCH_SIZE", 5)? as usize,
                enabled: env_bool("EXTRACTION_ENABLED", true),
            },
            validation: ValidationConfig {
                schedule: AgentSchedule {
                    interval: Duration::from_secs(validation_interval),
                    batch_size: env_u64("VALIDATION_BATCH_SIZE", 10)? as usize,
                    enabled: env_bool("VALIDATION_ENABLED", true),
                },
                min_evidence_level: env_u64("MIN_EVIDENCE_LEVEL", 2)? as u8,
                similarity_threshold: env_f64("SIMILARITY_THRESHOLD", 0.85)?,
            },
            knowledge_base: AgentSchedule {
                interval: Duration::from_secs(kb_interval),
                batch_size: env_u64("KB_BATCH_SIZE", 10)? as usize,
                enabled: env_bool("KB_ENABLED", true),
            },
            conflict: ConflictConfig {
                schedule: AgentSchedule {
                    interval: Duration::from_secs(conflict_interval),
                    batch_size: env_u64("CONFLICT_BATCH_SIZE", 10)? as usize,
                    enabled: env_bool("CONFLICT_ENABLED", true),
                },
                similarity_threshold: env_f64("CONFLICT_SIMILARITY_THRESHOLD", 0.75)?,
            },
            prompt_engineering: AgentSchedule {
                interval: Duration::from_secs(prompt_interval),
                batch_size: 50,
                enabled: env_bool("PROMPT_ENGINEERING_ENABLED", true),
            },
            retry: RetrySettings {
                max_attempts: env_u64("RETRY_MAX_ATTEMPTS", 3)? as u32,
                backoff_base: env_f64("RETRY_BACKOFF_BASE", 2.0)?,
                max_delay: Duration::from_secs(env_u64("RETRY_MAX_DELAY_SECONDS", 30)?),
            },
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: env_u64("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5)? as u32,
                reset_timeout: Duration::from_secs(env_u64("CIRCUIT_BREAKER_RESET_TIMEOUT_SECONDS", 60)?),
            },
            rate_limits: RateLimits {
                pubmed: pubmed_rate,
                crossref: crossref_rate,
                rss: rss_rate,
                llm: llm_rate,
            },
            llm: LlmSettings {
                base_url: llm_base_url,
                api_key: env_var("LLM_API_KEY").unwrap_or_default(),
                chat_model: env_var("LLM_CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
                embedding_model: env_var("LLM_EMBEDDING_MODEL").unwrap_or_else(|| "text-embedding-3-small".to_string()),
                embedding_dimension: env_u64("LLM_EMBEDDING_DIMENSION", 1536)? as usize,
            },
            alerts: AlertSettings {
                webhook_urls,
                min_severity: crate::alerting::AlertSeverity::Warning,
                error_rate_threshold: env_f64("ALERT_ERROR_RATE_THRESHOLD", 0.5)?,
                dedup_window: Duration::from_secs(env_u64("ALERT_DEDUP_WINDOW_SECONDS", 60)?),
            },
            health_check_interval: Duration::from_secs(env_u64("HEALTH_CHECK_INTERVAL_SECONDS", 60)?),
            shutdown_timeout: Duration::from_secs(env_u64("SHUTDOWN_TIMEOUT_SECONDS", 30)?),
            log_level,
            contact_email: env_var("CONTACT_EMAIL").unwrap_or_else(|| "research-bot@example.com".to_string()),
            perplexity_api_key: env_var("PERPLEXITY_API_KEY"),
        })
    }

    /// A config suitable for tests: short intervals, no network
    /// endpoints touched because the test double/mock store are used
    /// instead of the production LLM/store.
    pub fn for_testing() -> Self {
        std::env::set_var("ENVIRONMENT", "testing");
        Self::from_env().expect("testing preset must always validate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_llm_url() {
        std::env::set_var("ENVIRONMENT", "testing");
        std::env::set_var("LLM_BASE_URL", "ftp://example.com");
        let result = PipelineConfig::from_env();
        std::env::remove_var("LLM_BASE_URL");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        std::env::set_var("ENVIRONMENT", "testing");
        std::env::set_var("RESEARCH_INTERVAL_SECONDS", "0");
        let result = PipelineConfig::from_env();
        std::env::remove_var("RESEARCH_INTERVAL_SECONDS");
        assert!(result.is_err());
    }

    #[test]
    fn testing_preset_validates() {
        let config = PipelineConfig::for_testing();
        assert_eq!(config.environment, Environment::Testing);
    }
}
