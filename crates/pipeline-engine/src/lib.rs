//! Agent runtime for the evidence-curation pipeline.
//!
//! Six cooperating agents (`agents::research`, `agents::extraction`,
//! `agents::validation`, `agents::knowledge_base`, `agents::conflict`,
//! `agents::prompt_engineering`) run on independent periodic schedules,
//! coordinating only through the [`store::Store`] trait. [`engine::Engine`]
//! owns the schedule, the cancellation signal, and per-agent metrics.

pub mod agents;
pub mod alerting;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod resilience;
pub mod sources;
pub mod store;
pub mod types;
pub mod util;

pub use config::PipelineConfig;
pub use engine::Engine;
pub use error::PipelineError;
