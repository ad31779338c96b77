use super::PromptTuning;
use crate::error::CollaboratorError;
use std::collections::HashMap;

/// Prompt adjustments read from the `[tuning]` configuration table.
#[derive(Debug, Clone, Default)]
pub struct StaticPromptTuning {
    adjustments: HashMap<String, String>,
}

impl StaticPromptTuning {
    pub fn new(adjustments: HashMap<String, String>) -> Self {
        Self { adjustments }
    }
}

impl PromptTuning for StaticPromptTuning {
    fn adjustment(&self, role_id: &str) -> Result<Option<String>, CollaboratorError> {
        Ok(self
            .adjustments
            .get(role_id)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }
}
