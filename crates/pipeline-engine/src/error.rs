//! Error taxonomy for the pipeline, grounded on the teacher's
//! per-module `thiserror` enums (`SchedulerError`, `ResourceError`,
//! `ErrorHandlerError` in the reference runtime) aggregated behind one
//! top-level type for the binary's `anyhow` boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("response parsing failed: {0}")]
    Parse(String),
    #[error("capability unavailable")]
    Unavailable,
    #[error("cancelled by shutdown")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("response parsing failed: {0}")]
    Parse(String),
    #[error("cancelled by shutdown")]
    Cancelled,
}

/// Classifies an error as retryable per §7(a)-(c): transient upstream
/// conditions (network, timeout, 429/5xx) are retried; permanent
/// upstream conditions (4xx other than 429) and parse errors are not.
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

impl RetryableError for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Status(code) => *code == 429 || *code >= 500,
            SourceError::Parse(_) | SourceError::Cancelled => false,
        }
    }
}

impl RetryableError for LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Status(code) => *code == 429 || *code >= 500,
            LlmError::Parse(_) | LlmError::Unavailable | LlmError::Cancelled => false,
        }
    }
}

impl RetryableError for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("engine already running")]
    AlreadyRunning,
    #[error("engine is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("webhook transport error: {0}")]
    Transport(String),
    #[error("webhook status {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Alert(#[from] AlertError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("agent error in {agent}: {message}")]
    Agent { agent: String, message: String },
}
