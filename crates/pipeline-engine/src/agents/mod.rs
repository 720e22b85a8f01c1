//! The six cooperating agents (§4.2-§4.7) plus the [`Agent`] trait the
//! Engine drives them through. Agents never call each other directly;
//! staged records in the [`crate::store::Store`] are the only
//! inter-agent medium (§5).

pub mod conflict;
pub mod extraction;
pub mod knowledge_base;
pub mod prompt_engineering;
pub mod research;
pub mod validation;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::PipelineError;

/// The result of one `Process()` iteration, recorded by the Engine into
/// per-agent metrics (§4.1 step 2) and returned verbatim by `RunOnce`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentRunReport {
    pub processed: u64,
    pub errors: u64,
    pub details: serde_json::Value,
}

impl AgentRunReport {
    pub fn new(processed: u64, errors: u64) -> Self {
        Self { processed, errors, details: serde_json::Value::Null }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Every agent's uniform shape: a stable name for scheduling/metrics, one
/// processing step, and an optional cleanup hook run during shutdown.
/// `process` must never propagate a per-record failure past its own
/// batch (§7 Propagation policy) — only whole-batch setup failures (e.g.
/// the initial store read) should surface as `Err` here.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self) -> Result<AgentRunReport, PipelineError>;

    /// Runs with a bounded timeout (§4.1, §5 Cancellation) during
    /// `Engine::stop`. Most agents have nothing to flush since the store
    /// is the only coordination medium; override where it matters.
    async fn cleanup(&self) {}
}
