//! Rendered prompts handed to the model.

use serde::{Deserialize, Serialize};

/// A fully rendered prompt: optional system text plus the user turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prompt {
    /// System instructions
    pub system: Option<String>,
    /// User message
    pub user: String,
}

impl Prompt {
    /// Create a prompt with only a user message.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    /// Add a system message.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}
