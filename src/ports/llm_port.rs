//! Language model completion port trait.

use crate::domain::agents::AgentRole;
use crate::domain::error::TraderError;

/// A rendered two-part chat prompt for one agent role.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub role: AgentRole,
    pub system: String,
    pub user: String,
}

pub trait LlmPort {
    /// Return the model's text reply to `prompt`.
    fn complete(&self, prompt: &Prompt) -> Result<String, TraderError>;
}
