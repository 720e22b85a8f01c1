//! [PromptVersion] — a versioned, activatable system prompt for a category.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::claim::Category;
use super::ids::PromptVersionId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: PromptVersionId,
    pub category: Category,
    pub text: String,
    /// Monotonic per category.
    pub version: u32,
    /// KB statistics snapshot that produced this text, e.g. total claims,
    /// mean evidence, mean confidence, conflicting-area count.
    pub knowledge_snapshot: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub const PROMPT_MIN_LEN: usize = 100;
pub const PROMPT_MAX_LEN: usize = 8000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PromptValidationError {
    #[error("prompt length {0} outside [{PROMPT_MIN_LEN},{PROMPT_MAX_LEN}]")]
    LengthOutOfBounds(usize),
    #[error("prompt missing required token \"{0}\"")]
    MissingToken(&'static str),
}

/// Validate a synthesized prompt body: length within [100, 8000] and
/// containing both required tokens.
pub fn validate_prompt_text(text: &str) -> Result<(), PromptValidationError> {
    if text.len() < PROMPT_MIN_LEN || text.len() > PROMPT_MAX_LEN {
        return Err(PromptValidationError::LengthOutOfBounds(text.len()));
    }
    if !text.contains("evidence") {
        return Err(PromptValidationError::MissingToken("evidence"));
    }
    if !text.contains("scientific") {
        return Err(PromptValidationError::MissingToken("scientific"));
    }
    Ok(())
}
